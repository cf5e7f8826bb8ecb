// src/layout/mod.rs
pub mod editor;
pub mod geometry;
pub mod history;
pub mod mask;

pub use editor::{
    ContainerSize, DragMode, EditorView, LayoutConfirmation, LayoutEditor, PointerPosition,
    compose_final_prompt,
};
pub use geometry::{LayoutElement, LayoutSuggestion};
