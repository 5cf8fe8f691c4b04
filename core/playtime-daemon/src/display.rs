use std::sync::{Mutex, MutexGuard};

use playtime_core::{DisplayHandle, SubjectId};
use tracing::debug;

/// Headless display: remembers the latest text so clients can ask for it.
pub struct TextDisplay {
    subject: SubjectId,
    text: Mutex<Option<String>>,
}

impl TextDisplay {
    pub fn new(subject: SubjectId) -> Self {
        Self {
            subject,
            text: Mutex::new(None),
        }
    }

    pub fn current_text(&self) -> Option<String> {
        self.text().clone()
    }

    fn set(&self, value: Option<String>) {
        *self.text() = value;
    }

    fn text(&self) -> MutexGuard<'_, Option<String>> {
        self.text.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DisplayHandle for TextDisplay {
    fn push_text(&self, text: &str) {
        debug!(subject = %self.subject, text, "Display updated");
        self.set(Some(text.to_string()));
    }

    fn clear(&self) {
        debug!(subject = %self.subject, "Display cleared");
        self.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latest_text_until_cleared() {
        let display = TextDisplay::new(SubjectId::new_random());
        assert_eq!(display.current_text(), None);

        display.push_text("1s");
        display.push_text("2s");
        assert_eq!(display.current_text().as_deref(), Some("2s"));

        display.clear();
        assert_eq!(display.current_text(), None);
    }

    #[test]
    fn survives_a_poisoned_lock() {
        let display = std::sync::Arc::new(TextDisplay::new(SubjectId::new_random()));
        display.push_text("5s");

        let poisoner = std::sync::Arc::clone(&display);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.text.lock().unwrap();
            panic!("poison the display lock");
        })
        .join();

        assert_eq!(display.current_text().as_deref(), Some("5s"));
        display.push_text("6s");
        assert_eq!(display.current_text().as_deref(), Some("6s"));
    }
}
