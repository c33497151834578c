//! Prompts and the built-in resume template.
//!
//! Every string sent to the model is assembled here so the stages in
//! [`crate::pipeline::stages`] stay focused on sequencing. The builders are
//! pure functions, which lets the tests pin down exactly what each stage
//! sends without a live model.

/// Template used by the rewrite stage when the caller does not supply one.
///
/// The section headings are fixed: name/contact, summary, education, skills,
/// experience, projects.
pub const DEFAULT_RESUME_TEMPLATE: &str = r#"# Full Name

Phone: xxx | Email: xxx | Homepage / Blog: xxx

## Summary
(A short overview of strengths, years of experience and core competencies.)

## Education
**School** | Major | Degree | Dates
*   Relevant coursework: xxx
*   Honours & awards: xxx

## Skills
*   **Languages**: xxx
*   **Frameworks / Tools**: xxx
*   **Other**: xxx

## Experience
**Company** | Title | Dates
*   **Scope**: the project background or area of responsibility.
*   **Actions**: what you did and which technologies you used.
*   **Results**: quantified outcomes (e.g. cut latency by xx%, reduced bugs by xx%).

## Projects
**Project** | Role | Dates
*   **Description**: xxx
*   **Tech stack**: xxx
*   **Contribution**: xxx
"#;

/// System prompt for the analysis stage.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are a senior recruiter and resume expert. \
Analyse the resume below in detail: list its strengths and weaknesses and point out problems \
with formatting, content and wording. Answer in the same language as the resume.";

/// System prompt for the planning stage.
pub const PLANNING_SYSTEM_PROMPT: &str = "Based on the resume analysis report, draw up a \
detailed revision plan. List concrete, ordered steps and strategies so that the next stage \
can rewrite the resume from them. Answer in the same language as the report.";

/// Base system prompt for the rewrite stage; requirements are appended as rule 5.
pub const REWRITE_SYSTEM_PROMPT: &str = "You are a professional resume writer. Using the \
original resume and the revision plan, write a high-quality resume.\n\
You must strictly follow the format, structure and headings of the given [Resume Template].\n\
Rules:\n\
1. Use Markdown.\n\
2. Keep the content professional and concise.\n\
3. Highlight the candidate's strengths.\n\
4. Fill in the template and keep its section structure.";

/// Returned by the analysis stage when there is nothing to analyse.
pub const NO_CONTENT_TO_ANALYZE: &str = "No content to analyze.";
/// Returned by the planning stage when there is no analysis to plan from.
pub const NO_ANALYSIS_AVAILABLE: &str = "No analysis available.";
/// Returned by the rewrite stage when the original resume is empty.
pub const CANNOT_REWRITE_EMPTY: &str = "Cannot rewrite empty resume.";

/// User message for the analysis stage.
pub fn analysis_user_message(content: &str, requirements: Option<&str>) -> String {
    let mut msg = format!("Resume:\n{content}");
    if let Some(req) = requirements {
        msg.push_str(&format!(
            "\n\nAdditional requirements from the user:\n{req}\n\
             Focus the analysis on these requirements."
        ));
    }
    msg
}

/// User message for the planning stage.
pub fn planning_user_message(analysis: &str, requirements: Option<&str>) -> String {
    let mut msg = format!("Analysis report:\n{analysis}");
    if let Some(req) = requirements {
        msg.push_str(&format!(
            "\n\nAdditional requirements from the user:\n{req}\n\
             The plan must satisfy these requirements."
        ));
    }
    msg
}

/// System prompt for the rewrite stage.
pub fn rewrite_system_prompt(requirements: Option<&str>) -> String {
    match requirements {
        Some(req) => format!(
            "{REWRITE_SYSTEM_PROMPT}\n5. Pay special attention to the user's additional requirements: {req}"
        ),
        None => REWRITE_SYSTEM_PROMPT.to_string(),
    }
}

/// User message for the rewrite stage.
pub fn rewrite_user_message(template: &str, original: &str, plan: &str) -> String {
    format!(
        "[Resume Template]:\n{template}\n\nOriginal resume:\n{original}\n\nRevision plan:\n{plan}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_fixed_sections() {
        for heading in [
            "## Summary",
            "## Education",
            "## Skills",
            "## Experience",
            "## Projects",
        ] {
            assert!(DEFAULT_RESUME_TEMPLATE.contains(heading), "missing {heading}");
        }
        assert!(DEFAULT_RESUME_TEMPLATE.trim_start().starts_with("# "));
    }

    #[test]
    fn analysis_message_mentions_requirements_only_when_present() {
        let plain = analysis_user_message("CV", None);
        assert_eq!(plain, "Resume:\nCV");
        let steered = analysis_user_message("CV", Some("stress Java"));
        assert!(steered.contains("stress Java"));
    }

    #[test]
    fn rewrite_prompt_appends_rule_five() {
        assert!(!rewrite_system_prompt(None).contains("5."));
        assert!(rewrite_system_prompt(Some("one page")).ends_with("one page"));
    }

    #[test]
    fn rewrite_message_orders_template_original_plan() {
        let msg = rewrite_user_message("T", "O", "P");
        let t = msg.find("[Resume Template]").unwrap();
        let o = msg.find("Original resume").unwrap();
        let p = msg.find("Revision plan").unwrap();
        assert!(t < o && o < p);
    }
}
