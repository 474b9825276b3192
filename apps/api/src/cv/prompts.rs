// CV structuring prompt templates.

pub const CV_EXTRACTION_SYSTEM: &str = "\
You are an expert CV parser for university student CVs. \
Extract structured information exactly as stated in the CV. \
You MUST respond with valid JSON only, no markdown fences, no explanations. \
Never invent information that is not present in the text.";

pub const CV_EXTRACTION_PROMPT: &str = r#"Extract structured information from the following student CV.

The CV typically contains: a header (name, roll number, department), EDUCATION,
INTERNSHIPS, COMPETITIONS/CONFERENCES, PROJECTS, AWARDS AND ACHIEVEMENTS,
SKILLS AND EXPERTISE, COURSEWORK and EXTRA CURRICULAR ACTIVITIES.

CV TEXT:
{cv_text}

OUTPUT SCHEMA (return exactly this structure; use null or [] when absent):
{
  "student_name": "Full name from the header",
  "roll_number": "string | null",
  "department": "Department from the header, e.g. Chemical Engineering",
  "email": "string | null",
  "phone": "string | null",
  "education": [
    {"degree": "string", "institution": "string", "field": "string | null", "year": "string | null", "gpa": "string | null"}
  ],
  "internships": [
    {"title": "string", "organization": "string", "duration": "string | null", "objective": "string | null", "highlights": ["string"]}
  ],
  "competitions": [
    {"name": "string", "achievement": "string | null", "duration": "string | null", "objective": "string | null", "highlights": ["string"]}
  ],
  "projects": [
    {"title": "string", "type": "Self project | Course project | ...", "duration": "string | null", "objective": "string | null", "technologies": ["string"], "highlights": ["string"], "link": "string | null"}
  ],
  "skills": {
    "core_skills": ["string"],
    "programming_languages": ["string"],
    "frameworks": ["string"],
    "tools": ["string"]
  },
  "achievements": ["string"],
  "coursework": {"academic": ["string"], "moocs": ["string"]},
  "extracurriculars": {"social_cultural": ["string"], "clubs_societies": ["string"]},
  "interests": ["Research interests inferred from projects and internships"],
  "publications": ["string"]
}

Rules:
1. Parse every bullet point into the matching "highlights" array.
2. Keep links where available.
3. Derive the department from the degree line, e.g. "B.Tech.(Hons.) in CHEMICAL ENGINEERING" -> "Chemical Engineering"."#;
