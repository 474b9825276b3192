// Outreach prompt templates: match analysis, cold email and cover letter.
// {grounding} is replaced with llm_client::prompts::GROUNDING_INSTRUCTION.

pub const COVER_LETTER_SYSTEM: &str = "\
You are an expert at writing research internship cover letters. \
Respond with the letter text only: no preamble, no markdown, no JSON.";

pub const MATCH_ANALYSIS_PROMPT: &str = r#"Analyze the overlap between a student's background and a professor's research.

PROFESSOR INFORMATION:
Name: {professor_name}
Department: {department}
Research Areas: {research_areas}
Expertise Keywords: {expertise_keywords}
Recent Publications:
{publications}
Bio: {bio}

STUDENT INFORMATION:
Name: {student_name}
Skills: {skills}
Projects:
{projects}
Research Experience:
{research_experience}
Interests: {interests}

Find specific matches between:
1. Student skills and professor expertise keywords
2. Student projects and professor research areas
3. Student interests and the professor's work

{grounding}

OUTPUT SCHEMA:
{
  "matches": [
    {
      "category": "skill | project | research_area | publication",
      "student_item": "Specific item from the student profile",
      "professor_item": "Related item from the professor profile",
      "relevance_score": 0.0,
      "explanation": "Why this is a genuine match"
    }
  ],
  "key_talking_points": ["2-3 points worth mentioning in the email"]
}

Only include genuine matches, not forced ones. An empty "matches" array is acceptable."#;

pub const EMAIL_PROMPT: &str = r#"Write a cold email from a student to a professor asking for a research internship.

PROFESSOR INFORMATION:
Name: {professor_name}
Department: {department}
Research Areas: {research_areas}
Recent Work: {recent_work}

STUDENT INFORMATION:
Name: {student_name}
Education: {education}
Key Skills: {skills}
Relevant Projects:
{projects}

MATCHING ANALYSIS:
Key Matches:
{key_matches}
Key Talking Points: {talking_points}

REQUIREMENTS:
1. Subject line: short, specific and professional, e.g. "Research Internship Inquiry - <specific area>".
2. Body: greeting, one-sentence introduction, interest in THEIR specific research,
   relevant qualifications, a clear ask, professional closing.
3. Tone: formal but not stiff, confident but humble.
4. Length: 150-200 words.
5. Avoid generic phrases such as "I am fascinated by your work".

{grounding}

OUTPUT SCHEMA:
{
  "email_subject": "Subject line",
  "email_body": "Full email body"
}"#;

pub const COVER_LETTER_PROMPT: &str = r#"Write a cover letter for a research internship application.

PROFESSOR INFORMATION:
Name: Professor {professor_name}
Department: {department}
Research Focus: {research_areas}

STUDENT INFORMATION:
Name: {student_name}
Education:
{education}
Skills: {skills}
Key Projects:
{projects}
Research Experience:
{research_experience}

MATCHING ANALYSIS:
Key Matches:
{key_matches}

REQUIREMENTS:
1. Professional header and formatting.
2. An opening that shows specific interest in this professor's research.
3. Body: academic background, technical skills aligned with the research,
   relevant project or research experience, what the student hopes to contribute.
4. A closing with a clear call to action.
5. 300-350 words, one page at most.

{grounding}"#;
