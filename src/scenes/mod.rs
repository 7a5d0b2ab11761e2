pub mod level_editor;

pub use level_editor::LevelEditorScene;
