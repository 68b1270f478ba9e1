//! Fixed texts the bot sends outside of a job.

/// Reply to `/start`
pub const START_TEXT: &str = "👋 Hi! I turn voice and audio messages into text.\n\n\
Just send me a voice message or an audio file and I will transcribe it \
and return nicely formatted text.\n\n\
Use /help for more information.";

/// Reply to `/help`
pub const HELP_TEXT: &str = "🎙 I convert voice and audio messages into text with smart formatting.\n\n\
How to use:\n\
1. Send me a voice or audio message\n\
2. I will process it and return the formatted text\n\n\
Supported formats:\n\
- Voice messages\n\
- Audio files (mp3, wav, ogg, m4a)\n\n\
Commands:\n\
/start - Start the bot\n\
/help - Show this help message";

/// Reply to new work while shutting down
pub const SHUTTING_DOWN_TEXT: &str =
    "🛑 The bot is restarting and not accepting new files. Please try again in a minute.";

/// Reply when an owner is at the concurrency bound
pub fn rejection_text(limit: usize) -> String {
    format!(
        "⚠️ You already have {} active processing jobs.\nPlease wait for them to finish.",
        limit
    )
}
