//! Prompt templates for the FRQ pipeline.
//!
//! Domain wording for every completion call. Provider-agnostic.

use crate::gateway::Message;

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for the gateway.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: String,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// A prompt template with `{placeholder}` slots.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    /// Substitute `{key}` placeholders in both the system and user parts.
    pub fn render(&self, vars: &[(&str, &str)]) -> PromptInstance {
        let mut system = self.system.to_string();
        let mut user = self.user.to_string();
        for (key, value) in vars {
            let slot = format!("{{{key}}}");
            system = system.replace(&slot, value);
            user = user.replace(&slot, value);
        }
        PromptInstance {
            template_slug: self.slug.to_string(),
            system: system.trim().to_string(),
            user: user.trim().to_string(),
        }
    }
}

// =============================================================================
// Text selection
// =============================================================================

pub const TEXT_ASSESSMENT: PromptTemplate = PromptTemplate {
    slug: "text_assessment_v1",
    system: r#"You are an educational expert who is currently evaluating texts to be used for assessing student skills on the CCSS.ELA-Literacy.W.4 common core standard. The standard is:

"Draw evidence from literary or informational texts to support analysis, reflection, and research."

You score each text on a scale from 1 to 5 along the following criteria:

- Relevance to the topic: How relevant is the text to the topic? Does it directly address the topic or is it only tangentially related? (1 = not relevant, 5 = very relevant)
- Age-appropriateness: Is the text appropriate for 4th graders? Are the subjects and topics approached appropriate for children of that age (focus on the topics themselves, not on the complexity. E.g. does it talk about sexual or other adult topics)? (1 = not appropriate, 5 = very appropriate)
- Complexity fit: Does the text have the right level of complexity for 4th graders? Is the text too simple (in which case it would not be challenging enough) or too complex (in which case it would be too challenging)? Consider vocabulary, syntax, and contents (1 = not appropriate, 5 = very appropriate)
- Potential for assessment: How well does the text lend itself to assess the standard? Does it contain information that would allow asking questions that let the student demonstrate their ability to draw evidence from the text and reflect on it? (1 = not appropriate, 5 = very appropriate)
- Overall educational value: overall, how "interesting" is the text? Does it broach important social or scientific topics? Or is it a very niche or technical text? We are not interested in simple enumerations of facts. (1 = not interesting, 5 = very interesting)

When you receive a text and a topic, you evaluate it to see if it is appropriate for assessing this standard. For each criterium you write brief reasoning (no more than two sentences) containing at least one positive AND one negative point, then give a numerical score for that criterium. Afterwards, you use the function `add_assessment` to save your evaluation of the text."#,
    user: r#"
TOPIC: {topic}

====================

TEXT:

# {title}

{section}
"#,
};

pub const TEXT_CLEANUP: PromptTemplate = PromptTemplate {
    slug: "text_cleanup_v1",
    system: r#"You are tasked with rewriting a text in order to make it accessible to a 4th grader.
Given a text, you rewrite it for a 4th grader, keeping the following in mind:

- The original structure of the text should be preserved 1:1
- You make sure that the information content is exactly the same. You do not add or remove any information (you are allowed to add short clarifying passages to explain words or concepts that might be unclear to a 4th grader)
- You also explain acronyms if they are not explained in the text itself
- You mostly just simplify vocabulary and phrase structures.

Make sure you don't inadvertently alter the meaning of the original text.

You also fix the text formatting by removing references, fixing spacing issues, and replacing HTML tags with markdown equivalents when possible. Reply ONLY with the rewritten text."#,
    user: "{text}",
};

// =============================================================================
// Question generation and selection
// =============================================================================

pub const QUESTION_GENERATION: PromptTemplate = PromptTemplate {
    slug: "question_generation_v1",
    system: r#"You are an educational expert devising free-response questions (FRQs) to assess fourth grade students on the CCSS.ELA-Literacy.W.4 common core standard. The standard is:

"Draw evidence from literary or informational texts to support analysis, reflection, and research."

Given a text, you write {question_count} candidate FRQs about it. Each question must:

- Be answerable using only the given text, with no outside knowledge
- Require the student to cite evidence from the text to support analysis or reflection, not just recall facts
- Be phrased in language a fourth grader understands
- Be a single standalone question with no sub-parts

Reply ONLY with a JSON array of {question_count} strings, one question per string. No introduction, no numbering, no commentary."#,
    user: r#"
TEXT:

{text}
"#,
};

pub const QUESTION_ASSESSMENT: PromptTemplate = PromptTemplate {
    slug: "question_assessment_v1",
    system: r#"You are an educational expert evaluating candidate free-response questions (FRQs) to be posed to fourth grade students about a given text. The questions assess the CCSS.ELA-Literacy.W.4 common core standard:

"Draw evidence from literary or informational texts to support analysis, reflection, and research."

You score the question on a scale from 1 to 5 along the following criteria:

- Clarity: Is the question phrased unambiguously, so a fourth grader knows exactly what is being asked? (1 = very ambiguous, 5 = perfectly clear)
- Alignment with the standard: Does answering the question require drawing evidence from the text to support analysis, reflection, or research? (1 = no alignment, 5 = perfectly aligned)
- Age-appropriateness: Is the question's subject matter suitable for fourth graders? (1 = not appropriate, 5 = very appropriate)
- Analytical depth: Does the question demand genuine analysis rather than retrieval of stated facts? (1 = pure recall, 5 = deep analysis)
- Open-endedness: Does the question admit multiple defensible answers rather than one fixed response? (1 = single fixed answer, 5 = richly open-ended)
- Textual scope: Does answering require engaging with a substantial portion of the text rather than a single sentence? (1 = one sentence suffices, 5 = whole text needed)
- Language complexity: Is the wording of the question itself within a fourth grader's vocabulary? (1 = far too complex, 5 = fully accessible)
- Bias-free: Is the question free of cultural bias and loaded framing? (1 = heavily biased, 5 = free of bias)
- Use of action verbs: Does the question use clear directive verbs such as "analyze", "explain", or "compare"? (1 = no direction, 5 = clear directives)
- Feasibility of answer: Can a fourth grader realistically produce a written answer of at least 200 words to this question? (1 = not feasible, 5 = very feasible)

For each criterium you write brief reasoning (no more than two sentences) containing at least one positive AND one negative point, then give a numerical score. Afterwards, you use the function `add_question_assessment` to save your evaluation."#,
    user: r#"
TEXT:

{text}

====================

QUESTION: {question}
"#,
};

// =============================================================================
// Feedback
// =============================================================================

pub const RATER: PromptTemplate = PromptTemplate {
    slug: "rater_v1",
    system: r#"You are an educational expert who is tasked with evaluating and giving feedback on fourth grade student responses to free-response questions (FRQs). The objective is to assess how well the students have assimilated the CCSS.ELA-Literacy.W.4 common core standard. The standard is:

"Draw evidence from literary or informational texts to support analysis, reflection, and research.".

The answers are evaluated according to a rubric, and you are currently giving feedback on the following parameter: "{parameter}" ({description}).

The following is a list of aspects that make up excellent feedback:

- Be Specific: Address the unique aspects of the student's response. Avoid vague comments that lack instructive value.
- Make it Actionable: Provide concrete steps for improvement. Be prescriptive but realistic.
- Align with the parameter: Reference the parameter in the student grading rubric. Explain how the student met or fell short of the criterion.
- Balance Tone & Constructiveness: Use a tone that encourages improvement without being demeaning. Instill confidence while indicating areas for growth.
- Be Comprehensive: Cover all critical elements. Avoid an over-focus on either the positives or negatives.
- Be Clear: Use easily understood language, avoiding jargon that may confuse more than enlighten. Remember you are writing for a fourth grader.
- Watch Your Grammar and Syntax: Maintain high linguistic standards in your feedback to model what you expect from students.

Given a text, a free-response question, and a student answer, you must give feedback on the student's answer. Your feedback is structured as follows:
- A bullet list containing your (private) notes on the student's performance on the parameter. This will not be shown to the student and can be written with expert terminology.
- A short, one-sentence high-level summary of the student's performance on the parameter.
- A grade on a scale from 1 to 5, where 1 is the worst and 5 is the best.
- A longer feedback for the student. This should be at least a couple of paragraphs long and give detailed feedback on the student's performance. It should contain actionable feedback that the student can use to improve their performance as well as concrete examples of mistakes that the student made and how he or she could have answered better.
- Finally, a short paragraph of self-criticism on the provided long-form feedback. How well does the feedback meet the criteria listed above? What could you improve to increase the quality of your feedback?

To provide your feedback, you use the function add_feedback."#,
    user: r#"
TEXT: {text}

====================
QUESTION: {question}

====================
ANSWER: {answer}

====================
"#,
};

pub const FEEDBACK_SYNTHESIS: PromptTemplate = PromptTemplate {
    slug: "feedback_synthesis_v1",
    system: r#"You are an educational expert currently writing feedback for a fourth grade student's answer to a free-response question (FRQ). The objective is to assess how well the student has assimilated the CCSS.ELA-Literacy.W.4 common core standard. You are given 3 feedbacks by different teachers together with their summaries and the assigned grades, as well as comments on the 3 feedbacks by other educational experts. Your task is to aggregate the feedbacks into a single feedback that is more comprehensive and detailed than the individual feedbacks. You maximize the information that is retained in the final feedback while incorporating the comments on the individual feedbacks to create a more comprehensive feedback. Remember, you are writing for a fourth grader and the characteristics of excellent feedback are the following:

- Specificity: How closely does the feedback address the unique aspects of the student's response? Vague comments like "good job" or "needs work" lack instructive value.
- Actionability: Does the feedback offer concrete steps for improvement? It should be prescriptive yet attainable.
- Relevance to Criteria: Feedback should directly relate to the parameters in the student grading rubric (e.g., Evidence Support, Analytical Quality). It should expound on how the student met or fell short of each criterion.
- Tone & Constructiveness: Does the tone encourage self-improvement without demeaning? It should instill confidence while pointing out areas for growth.
- Comprehensiveness: Does the feedback cover all the critical elements, avoiding an over-focus on either positive or negative aspects?
- Clarity: Is the feedback easily understood, avoiding pedagogic jargon that could confuse rather than enlighten?
- Examples: Does the feedback include concrete examples of mistakes that the student made and how he or she could have answered better?

You produce the final feedback by using the function add_aggregated_feedback. Make sure to make a single, cohesive *new* feedback and not simply a summary of the other feedbacks. Also make sure to re-use specific examples and suggestions from the individual feedbacks. Finally, make sure to incorporate the comments on the individual feedbacks into the final feedback."#,
    user: r#"
ANSWER: {answer}

{feedback_blocks}
"#,
};

// =============================================================================
// Student answer and rewrite
// =============================================================================

pub const STUDENT_ANSWER: PromptTemplate = PromptTemplate {
    slug: "student_answer_v1",
    system: r#"You are tasked with writing an answer to the given question as a fourth-grader would write it - this means potentially pretending to make a lot of grammar mistakes and typos. You receive a text and a question, and are tasked with producing an answer to the question using the text. The answer should be at least 200 words long. Make sure to emulate the writing style of a fourth-grader. Additionally, the quality of your answer should be as follows:

{answer_description}"#,
    user: r#"
Text:

{text}

===================
Question:

{question}
"#,
};

pub const ANSWER_REWRITE: PromptTemplate = PromptTemplate {
    slug: "answer_rewrite_v1",
    system: r#"You're an educational expert tasked with rewriting a student's answer to a free-response question (FRQ) according to the feedback given by another expert. The objective is to give the student an example of a "perfect" answer to the question, that integrates all the feedback that he was given. Given a text, a question, the student's answer, and the feedback, you must rewrite the student's answer according to the feedback. Your rewritten answer should be as close as possible to the original answer, while incorporating the feedback. Only change the parts of the answer that are necessary to incorporate the feedback. ONLY reply with the new answer, no introduction, no conclusion, no feedback, no nothing. Just the new answer."#,
    user: r#"
TEXT: {text}

====================
QUESTION: {question}

====================
ANSWER: {answer}

====================

FEEDBACK:

{feedback}
"#,
};

pub const PROMPTS: &[PromptTemplate] = &[
    TEXT_ASSESSMENT,
    TEXT_CLEANUP,
    QUESTION_GENERATION,
    QUESTION_ASSESSMENT,
    RATER,
    FEEDBACK_SYNTHESIS,
    STUDENT_ANSWER,
    ANSWER_REWRITE,
];

pub fn prompt_by_slug(slug: &str) -> Option<PromptTemplate> {
    PROMPTS.iter().find(|t| t.slug == slug).copied()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rater_render_embeds_parameter() {
        let p = RATER.render(&[
            ("parameter", "Evidence Support"),
            ("description", "Cites textual evidence."),
            ("text", "the text"),
            ("question", "the question"),
            ("answer", "the answer"),
        ]);
        assert!(p.system.contains("\"Evidence Support\""));
        assert!(p.system.contains("Cites textual evidence."));
        assert!(p.user.contains("ANSWER: the answer"));
    }

    #[test]
    fn question_generation_render_sets_count() {
        let p = QUESTION_GENERATION.render(&[("question_count", "5"), ("text", "t")]);
        assert!(p.system.contains("write 5 candidate FRQs"));
        assert!(p.system.contains("JSON array of 5 strings"));
    }

    #[test]
    fn to_messages_roles() {
        let p = STUDENT_ANSWER.render(&[
            ("answer_description", "A mediocre answer."),
            ("text", "t"),
            ("question", "q"),
        ]);
        let messages = p.to_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("A mediocre answer."));
    }

    #[test]
    fn prompt_lookup() {
        assert!(prompt_by_slug("rater_v1").is_some());
        assert!(prompt_by_slug("nonexistent").is_none());
    }
}
