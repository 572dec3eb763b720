use crate::domain::entities::message::{Conversation, Message};

pub const SYSTEM_PROMPT: &str = "\
You are an assistant for a RateMyProfessor-like service. Students ask you questions to find professors \
that match their needs. Each question comes with the professors retrieved for it from our reviews \
database, listed from the most to the least relevant.

For each question:
1. Understand what the student is looking for: subject, teaching style, difficulty, workload...
2. Present the 3 most relevant retrieved professors with their name, subject, rating (out of 5 stars) \
and a short summary of what students say about them.
3. If the question is vague, ask the student to clarify before recommending anyone.
4. If fewer than 3 relevant professors were found, say so and present the ones that were found.
5. Stay objective: only report what the retrieved reviews say, without personal judgment.
6. When asked about a specific aspect, focus your answer on it.

Only use the retrieved information. Never invent professors, courses or ratings: when a piece of \
information is missing, say that it is not available.";

/// Builds the messages sent to the language model: the system prompt, the previous messages in their
/// original order, then the last user message with the retrieved `context` appended.
pub fn build_completion_messages(conversation: Conversation, context: &str) -> Vec<Message> {
    let (history, last) = conversation.into_parts();

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(SYSTEM_PROMPT));
    messages.extend(history);
    messages.push(Message::user(last.content + context));

    messages
}
