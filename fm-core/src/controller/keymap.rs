//! Keyboard shortcuts mapped to command ids.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;
use tracing::trace;

use crate::config::FeatureFlags;

#[derive(Debug, Clone)]
pub struct Keymap {
    bindings: HashMap<KeyEvent, &'static str>,
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}

fn ctrl_shift(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL | KeyModifiers::SHIFT)
}

fn alt(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::ALT)
}

/// Drops press/repeat state and folds shifted letters into `SHIFT` so
/// terminal differences do not change the lookup.
fn normalize(event: KeyEvent) -> KeyEvent {
    let mut modifiers = event.modifiers & (KeyModifiers::CONTROL | KeyModifiers::SHIFT | KeyModifiers::ALT);
    let code = match event.code {
        KeyCode::Char(c) if c.is_ascii_uppercase() => {
            modifiers |= KeyModifiers::SHIFT;
            KeyCode::Char(c.to_ascii_lowercase())
        }
        code => code,
    };
    KeyEvent::new(code, modifiers)
}

impl Keymap {
    pub fn new(features: &FeatureFlags) -> Self {
        let mut bindings = HashMap::with_capacity(20);

        bindings.insert(ctrl('x'), "cut");
        bindings.insert(ctrl('c'), "copy");
        bindings.insert(ctrl('v'), "paste");
        bindings.insert(ctrl_shift('v'), "paste-into-folder");
        bindings.insert(ctrl('a'), "select-all");
        bindings.insert(ctrl('e'), "new-folder");
        bindings.insert(key(KeyCode::F(2)), "rename");
        bindings.insert(KeyEvent::new(KeyCode::Enter, KeyModifiers::CONTROL), "rename");
        bindings.insert(ctrl('r'), "refresh");
        bindings.insert(key(KeyCode::F(5)), "refresh");
        bindings.insert(alt('s'), "share");
        bindings.insert(ctrl_shift('e'), "unmount");

        if features.trash {
            bindings.insert(key(KeyCode::Delete), "move-to-trash");
            bindings.insert(KeyEvent::new(KeyCode::Delete, KeyModifiers::SHIFT), "delete");
            bindings.insert(KeyEvent::new(KeyCode::Backspace, KeyModifiers::ALT), "move-to-trash");
        } else {
            bindings.insert(key(KeyCode::Delete), "delete");
            bindings.insert(KeyEvent::new(KeyCode::Backspace, KeyModifiers::ALT), "delete");
        }

        Self { bindings }
    }

    pub fn command_for(&self, event: KeyEvent) -> Option<&'static str> {
        let normalized = normalize(event);
        let command = self.bindings.get(&normalized).copied();
        trace!(?normalized, ?command, "Key lookup");
        command
    }

    pub fn bind(&mut self, event: KeyEvent, command: &'static str) {
        self.bindings.insert(normalize(event), command);
    }

    /// Shortcuts bound to `command`.
    pub fn keys_for(&self, command: &str) -> Vec<KeyEvent> {
        self.bindings
            .iter()
            .filter(|(_, c)| **c == command)
            .map(|(k, _)| *k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifted_letters_are_normalized() {
        let keymap = Keymap::new(&FeatureFlags::default());
        let event = KeyEvent::new(KeyCode::Char('V'), KeyModifiers::CONTROL);

        assert_eq!(keymap.command_for(event), Some("paste-into-folder"));
        assert_eq!(keymap.command_for(ctrl('v')), Some("paste"));
        assert_eq!(keymap.command_for(key(KeyCode::Char('z'))), None);
    }

    #[test]
    fn test_delete_follows_trash_flag() {
        let with_trash = Keymap::new(&FeatureFlags::default());
        let without = Keymap::new(&FeatureFlags {
            trash: false,
            ..FeatureFlags::default()
        });

        assert_eq!(with_trash.command_for(key(KeyCode::Delete)), Some("move-to-trash"));
        assert_eq!(without.command_for(key(KeyCode::Delete)), Some("delete"));
        assert_eq!(with_trash.keys_for("refresh").len(), 2);
    }
}
