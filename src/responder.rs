use crate::messages::UserRef;

/// Identity the scripted assistant posts under.
pub const AI_USER_ID: &str = "ai-assistant";
pub const AI_USERNAME: &str = "AI Assistant";

pub fn ai_user() -> UserRef {
    UserRef {
        id: AI_USER_ID.to_string(),
        username: AI_USERNAME.to_string(),
    }
}

/// Substrings that make a chat message worth a scripted reply.
const TRIGGERS: [&str; 5] = ["ai", "help", "?", "hello", "hi"];

/// Ordered reply table: the first entry whose needles match wins, so
/// "hello?" gets the greeting, not the question reply.
const REPLIES: &[(&[&str], &str)] = &[
    (&["hello", "hi"], "Hello! How can I assist you today?"),
    (&["help"], "I'm here to help! What would you like to know about?"),
    (
        &["how are you"],
        "I'm just a bot, but I'm functioning well! How about you?",
    ),
    (
        &["what is your name"],
        "I'm an AI assistant created to help you. What would you like to talk about?",
    ),
    (
        &["what can you do"],
        "I can answer questions, provide information, and chat with you. Ask me anything!",
    ),
    (
        &["who created you"],
        "I was developed to assist users in this chat network! My knowledge comes from various sources.",
    ),
    (
        &["what is ai", "artificial intelligence"],
        "Artificial Intelligence is a field of computer science that enables machines to simulate human intelligence. Would you like to learn more about it?",
    ),
    (
        &["machine learning"],
        "Machine Learning is a branch of AI that focuses on developing systems that can learn from and make predictions based on data.",
    ),
    (
        &["what is the meaning of life"],
        "That's a deep question! Some say it's happiness, others say it's about making an impact. What do you think?",
    ),
    (
        &["tell me a joke"],
        "Why don't skeletons fight each other? Because they don't have the guts!",
    ),
    (
        &["what time is it"],
        "I'm not connected to a clock, but you can check the time on your device!",
    ),
    (
        &["where are you from"],
        "I exist in the digital world, wherever you need me!",
    ),
    (
        &["what is your favorite color"],
        "I don't have eyes, but I've heard blue is quite popular!",
    ),
    (
        &["tell me a fun fact"],
        "Did you know that octopuses have three hearts?",
    ),
    (&["thank"], "You're welcome! Let me know if you need anything else."),
    (&["bye", "goodbye"], "Goodbye! Have a great day!"),
    (
        &["?"],
        "That's an interesting question. Let me think about it and get back to you.",
    ),
];

const FALLBACK: &str =
    "That's an interesting point. Could you elaborate more on what you're looking for?";

/// Whether a chat message should get a delayed scripted reply at all.
pub fn wants_reply(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Canned reply for a chat message: first matching predicate wins,
/// deterministic, no side effects.
pub fn respond(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    for (needles, reply) in REPLIES {
        if needles.iter().any(|n| lower.contains(n)) {
            return reply;
        }
    }
    FALLBACK
}

/// Greeting posted shortly after someone joins a room.
pub fn welcome(username: &str) -> String {
    format!("Welcome to the room, {username}! Feel free to join the conversation.")
}
