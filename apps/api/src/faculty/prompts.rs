// Faculty enrichment prompt templates.

pub const KEYWORD_EXTRACTION_SYSTEM: &str = "\
You are an expert at analyzing academic profiles. \
You MUST respond with a JSON array of strings only, no markdown fences, no explanations.";

pub const KEYWORD_EXTRACTION_PROMPT: &str = r#"Extract the key expertise keywords of this professor that would help match them with prospective research interns.

Professor Name: {name}
Department: {department}
Research Areas: {research_areas}
Bio: {bio}

Publications and projects found by web search:
{search_context}

Return 5-10 specific, technical keywords covering technologies and tools, research methods, application domains and the technical skills an intern would need.

Example output: ["machine learning", "computer vision", "PyTorch"]"#;
