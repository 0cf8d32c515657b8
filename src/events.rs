use crate::interaction::Selection;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    SelectionChanged(Option<Selection>),
    LayoutLoaded { pads: usize, traces: usize },
}

impl fmt::Display for EditorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorEvent::SelectionChanged(Some(selection)) => write!(f, "SelectionChanged {selection}"),
            EditorEvent::SelectionChanged(None) => write!(f, "SelectionChanged none"),
            EditorEvent::LayoutLoaded { pads, traces } => {
                write!(f, "LayoutLoaded pads={pads} traces={traces}")
            }
        }
    }
}

#[derive(Default, Debug)]
pub struct EventBus {
    events: Vec<EditorEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: EditorEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<EditorEvent> {
        self.events.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
