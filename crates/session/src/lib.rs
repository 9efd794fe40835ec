/// Figment-backed UI preferences with lock-free reads.
pub mod preferences;
/// Conversation message control for one UI session.
pub mod session;

pub use preferences::{
    PREFERENCES_DIRECTORY_NAME, PREFERENCES_FILE_NAME, PreferencesError, PreferencesStore,
    UiPreferences,
};
pub use session::MessageListSession;
