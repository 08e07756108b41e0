//! Opening-message synthesis for a journey step.
//!
//! When a journey starts, the orchestrator does not relay user text: it
//! builds a structured prompt from the catalog step, the cross-helper
//! context, and the helper's clarifying-question template.

use crate::catalog::{Helper, Step, task_title};

/// Soft length guidance passed to the backend, not an enforced cap.
const LENGTH_GUIDANCE_WORDS: usize = 175;

/// Insight bullets surfaced per relevant prior helper, at most.
const INSIGHTS_PER_HELPER: usize = 2;

/// Build the synthesized opening prompt for a step.
///
/// `insights` is the relevance-gated cross-helper context: one entry per
/// prior helper this step's helper may read. An empty slice (the
/// journey's first helper) produces no prior-helper section.
pub fn opening_prompt(step: &Step, insights: &[(Helper, Vec<String>)]) -> String {
    let mut prompt = String::new();
    prompt.push_str(&step.seed);
    prompt.push_str("\n\nTasks for this step:\n");

    // Required tasks first; relative order within each group preserved.
    let mut tasks: Vec<_> = step.tasks.iter().collect();
    tasks.sort_by_key(|t| !t.required);

    for (i, task) in tasks.iter().enumerate() {
        let marker = if task.required { "required" } else { "optional" };
        prompt.push_str(&format!("{}. {} ({marker})\n", i + 1, task_title(&task.id)));
    }

    if let Some(first) = tasks.first() {
        prompt.push_str(&format!(
            "\nStart with the first task: {}.\n",
            task_title(&first.id)
        ));
    }

    let bullets = insight_bullets(insights);
    if !bullets.is_empty() {
        prompt.push_str("\nWhat earlier helpers learned:\n");
        prompt.push_str(&bullets);
    }

    prompt.push_str(&format!(
        "\nGreet the user, walk them into the step, and ask exactly one question: \"{}\"\n\
         Keep your opening under {LENGTH_GUIDANCE_WORDS} words.",
        step.helper.clarifying_question()
    ));

    prompt
}

/// System prompt for a helper's conversation.
///
/// `shared_context` is the cross-helper section: either the
/// relevance-gated summary the caller assembled, or the request-supplied
/// override. Empty means no prior-helper section at all.
pub fn helper_system_prompt(helper: Helper, shared_context: &str) -> String {
    let role = match helper {
        Helper::Muse => "You shape vague ideas into a problem worth solving and a first audience.",
        Helper::Architect => {
            "You turn a validated idea into a buildable technical design and stack choice."
        }
        Helper::Builder => "You keep scope honest and get the first working version shipped.",
        Helper::Herald => "You plan how the launch reaches the right people.",
        Helper::Mentor => "You read early signals and pick the next growth experiment.",
        Helper::Sage => "You step back, weigh risks, and decide what changes.",
    };

    let mut prompt = format!(
        "You are the {}, one of six helpers guiding a founder's journey. {}\n\
         Be concise and concrete. Ask one question at a time.",
        helper.display_name(),
        role
    );
    if !shared_context.is_empty() {
        prompt.push_str("\n\nWhat other helpers have learned so far:\n");
        prompt.push_str(shared_context);
    }
    prompt
}

/// At most two bullets per relevant prior helper, display name
/// capitalized.
fn insight_bullets(insights: &[(Helper, Vec<String>)]) -> String {
    let mut out = String::new();
    for (helper, entries) in insights {
        for entry in entries.iter().take(INSIGHTS_PER_HELPER) {
            out.push_str(&format!("- {}: {}\n", helper.display_name(), entry));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::JourneyCatalog;

    fn step(catalog: &JourneyCatalog, id: &str) -> Step {
        catalog.step(id).unwrap().clone()
    }

    #[test]
    fn tasks_listed_required_first_preserving_order() {
        let catalog = JourneyCatalog::load(None).unwrap();
        let prompt = opening_prompt(&step(&catalog, "spark-the-idea"), &[]);

        let define = prompt.find("1. Define Problem (required)").unwrap();
        let identify = prompt.find("2. Identify Audience (required)").unwrap();
        let names = prompt.find("3. Brainstorm Names (optional)").unwrap();
        assert!(define < identify && identify < names);
        assert!(prompt.contains("Start with the first task: Define Problem."));
    }

    #[test]
    fn optional_tasks_sort_after_required_ones() {
        let text = r#"
            [[steps]]
            id = "mixed"
            level = 1
            helper = "builder"
            seed = "s"
            call_to_action = "c"
            tasks = [
                { id = "warm-up", required = false },
                { id = "core-work", required = true },
            ]
        "#;
        let catalog = JourneyCatalog::from_toml(text).unwrap();
        let prompt = opening_prompt(&step(&catalog, "mixed"), &[]);
        assert!(prompt.contains("1. Core Work (required)"));
        assert!(prompt.contains("2. Warm Up (optional)"));
        assert!(prompt.contains("Start with the first task: Core Work."));
    }

    #[test]
    fn at_most_two_bullets_per_helper_capitalized() {
        let catalog = JourneyCatalog::load(None).unwrap();
        let insights = vec![
            (
                Helper::Muse,
                vec![
                    "audience is home cooks".to_string(),
                    "problem is meal planning".to_string(),
                    "third insight never shown".to_string(),
                ],
            ),
            (Helper::Architect, vec!["stack is axum".to_string()]),
        ];
        let prompt = opening_prompt(&step(&catalog, "ship-the-mvp"), &insights);

        assert!(prompt.contains("- Muse: audience is home cooks"));
        assert!(prompt.contains("- Muse: problem is meal planning"));
        assert!(!prompt.contains("third insight never shown"));
        assert!(prompt.contains("- Architect: stack is axum"));
        assert_eq!(prompt.matches("- Muse:").count(), 2);
    }

    #[test]
    fn empty_relevance_produces_no_prior_helper_section() {
        let catalog = JourneyCatalog::load(None).unwrap();
        let prompt = opening_prompt(&step(&catalog, "spark-the-idea"), &[]);
        assert!(!prompt.contains("What earlier helpers learned"));
    }

    #[test]
    fn exactly_one_clarifying_question_from_the_template() {
        let catalog = JourneyCatalog::load(None).unwrap();
        let prompt = opening_prompt(&step(&catalog, "spark-the-idea"), &[]);
        assert!(prompt.contains("ask exactly one question"));
        assert!(prompt.contains(Helper::Muse.clarifying_question()));
        assert_eq!(prompt.matches("ask exactly one question").count(), 1);
    }

    #[test]
    fn length_guidance_is_included() {
        let catalog = JourneyCatalog::load(None).unwrap();
        let prompt = opening_prompt(&step(&catalog, "sound-the-launch"), &[]);
        assert!(prompt.contains("under 175 words"));
    }

    #[test]
    fn system_prompt_includes_shared_context_only_when_present() {
        let bare = helper_system_prompt(Helper::Muse, "");
        assert!(bare.contains("You are the Muse"));
        assert!(!bare.contains("other helpers have learned"));

        let with_context = helper_system_prompt(Helper::Builder, "- Muse: audience is home cooks");
        assert!(with_context.contains("You are the Builder"));
        assert!(with_context.contains("- Muse: audience is home cooks"));
    }
}
