//! Prompt construction shared by the HTTP scorers.

use gradewise_core::traits::ScoreRequest;

pub const SYSTEM_PROMPT: &str = "You are an experienced teacher grading student work against a rubric. \
Score the answer on the single criterion you are given. Respond ONLY with a JSON object of the form \
{\"score\": <number>, \"reason\": \"<one or two sentences>\"}. Do not add any other text.";

/// The user message for scoring one criterion.
pub fn criterion_prompt(request: &ScoreRequest) -> String {
    let criterion = &request.criterion;
    format!(
        "Assignment: {title}\n\
         Criterion: {criterion_title} (id: {id})\n\
         Allowed scores: {min} to {max}\n\n\
         Student answer:\n{content}\n\n\
         Return the score for this criterion and a short reason as JSON.",
        title = request.assignment_title,
        criterion_title = criterion.title,
        id = criterion.id,
        min = criterion.scale.min,
        max = criterion.scale.max,
        content = if request.content.trim().is_empty() {
            "(no answer submitted)"
        } else {
            request.content.as_str()
        },
    )
}
