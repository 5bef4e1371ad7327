use winit::keyboard::KeyCode;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PreviewAction {
    ToggleEffect,
    Exit,
}

impl PreviewAction {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::Space | KeyCode::KeyE => Some(PreviewAction::ToggleEffect),
            KeyCode::Escape => Some(PreviewAction::Exit),
            _ => None,
        }
    }
}
