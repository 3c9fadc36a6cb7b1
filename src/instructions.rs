use crate::command::{NEXT_MARKER, REPLAY_MARKER, SHOW_MARKER_PREFIX};
use induction_realtime_types::Playlist;

/// Display name for a locale code, used to tell the narrator which language to speak.
pub fn language_name(locale: &str) -> &str {
    let primary = locale.split(|c: char| c == '-' || c == '_').next().unwrap_or(locale);
    match primary.to_ascii_lowercase().as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "pl" => "Polish",
        "ro" => "Romanian",
        "uk" => "Ukrainian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "zh" => "Chinese",
        _ => locale,
    }
}

/// Session-wide instructions for the narrating trainer.
///
/// The narrator reads each line it is sent and may append one control marker
/// when the clip should change.
pub fn trainer_instructions(site: &str, locale: &str) -> String {
    format!(
        "You are a site induction trainer for {site}. Speak only {language}. \
         Each message you receive is the script line for the clip on screen: \
         read it aloud naturally, in a calm and clear voice, without adding new safety rules. \
         When the trainee asks to move on, end your reply with {next}. \
         When they ask to hear the clip again, end your reply with {replay}. \
         When they ask for a specific clip, end your reply with {show}<clip id>]. \
         Never say the markers out loud and use at most one per reply.",
        site = site,
        language = language_name(locale),
        next = NEXT_MARKER,
        replay = REPLAY_MARKER,
        show = SHOW_MARKER_PREFIX,
    )
}

/// Instructions for the playlist currently loaded.
pub fn for_playlist(playlist: &Playlist) -> String {
    trainer_instructions(playlist.site(), playlist.locale())
}
