// src/layout/editor.rs

use super::geometry::{CANVAS_EXTENT, LayoutElement, LayoutSuggestion};
use super::history::History;
use super::mask::{MaskImage, rasterize};
use crate::errors::StudioError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragMode {
    Move,
    Resize,
}

/// Pointer position in container pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

/// Size of the on-screen canvas container in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct DragSession {
    element_id: String,
    mode: DragMode,
    container: ContainerSize,
    last_position: PointerPosition,
    pending: (f64, f64),
    moved: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum EditorState {
    Idle,
    Dragging(DragSession),
}

/// Raster mask plus the readable description of the confirmed layout.
#[derive(Debug, Clone)]
pub struct LayoutConfirmation {
    pub mask: MaskImage,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorView {
    pub canvas_ratio: String,
    /// Elements in render order: the selected element last.
    pub elements: Vec<LayoutElement>,
    pub selected: Option<String>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub dragging: Option<DragMode>,
}

#[derive(Debug, Clone)]
pub struct LayoutEditor {
    canvas_ratio: String,
    elements: Vec<LayoutElement>,
    selected: Option<String>,
    history: History<Vec<LayoutElement>>,
    state: EditorState,
}

impl LayoutEditor {
    pub fn new(suggestion: LayoutSuggestion, history_limit: usize) -> Self {
        let suggestion = suggestion.normalized();
        Self {
            canvas_ratio: suggestion.canvas_ratio,
            history: History::new(suggestion.elements.clone(), history_limit),
            elements: suggestion.elements,
            selected: None,
            state: EditorState::Idle,
        }
    }

    pub fn elements(&self) -> &[LayoutElement] {
        &self.elements
    }

    pub fn element(&self, id: &str) -> Option<&LayoutElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn canvas_ratio(&self) -> f64 {
        super::geometry::parse_canvas_ratio(&self.canvas_ratio)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, EditorState::Dragging(_))
    }

    pub fn can_undo(&self) -> bool {
        !self.is_dragging() && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.is_dragging() && self.history.can_redo()
    }

    /// Elements in stacking order with the selected one promoted to the top.
    pub fn render_order(&self) -> Vec<&LayoutElement> {
        let (mut rest, selected): (Vec<_>, Vec<_>) = self
            .elements
            .iter()
            .partition(|e| Some(e.id.as_str()) != self.selected.as_deref());
        rest.extend(selected);
        rest
    }

    pub fn view(&self) -> EditorView {
        EditorView {
            canvas_ratio: self.canvas_ratio.clone(),
            elements: self.render_order().into_iter().cloned().collect(),
            selected: self.selected.clone(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            dragging: match &self.state {
                EditorState::Idle => None,
                EditorState::Dragging(session) => Some(session.mode),
            },
        }
    }

    pub fn select(&mut self, id: &str) -> Result<(), StudioError> {
        self.require(id)?;
        self.selected = Some(id.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn pointer_down(
        &mut self,
        id: &str,
        mode: DragMode,
        position: PointerPosition,
        container: ContainerSize,
    ) -> Result<(), StudioError> {
        if self.is_dragging() {
            return Err(StudioError::InvalidState(
                "A gesture is already in progress".to_string(),
            ));
        }
        if !(container.width > 0.0 && container.height > 0.0) {
            return Err(StudioError::Validation(
                "Container size must be positive".to_string(),
            ));
        }
        self.select(id)?;
        self.state = EditorState::Dragging(DragSession {
            element_id: id.to_string(),
            mode,
            container,
            last_position: position,
            pending: (0.0, 0.0),
            moved: false,
        });
        Ok(())
    }

    /// Records an incremental delta. Returns `false` when no gesture is active.
    pub fn pointer_move(&mut self, position: PointerPosition) -> bool {
        let EditorState::Dragging(session) = &mut self.state else {
            return false;
        };
        let dx = (position.x - session.last_position.x) / session.container.width * CANVAS_EXTENT;
        let dy = (position.y - session.last_position.y) / session.container.height * CANVAS_EXTENT;
        if dx.is_finite() && dy.is_finite() {
            session.pending.0 += dx;
            session.pending.1 += dy;
            session.moved = true;
        }
        session.last_position = position;
        true
    }

    /// Applies the accumulated delta as one mutation. Returns whether the
    /// layout changed.
    pub fn flush_frame(&mut self) -> bool {
        let canvas_ratio = self.canvas_ratio();
        let EditorState::Dragging(session) = &mut self.state else {
            return false;
        };
        let (dx, dy) = std::mem::take(&mut session.pending);
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        let Some(element) = self.elements.iter_mut().find(|e| e.id == session.element_id) else {
            return false;
        };
        let before = element.rect;
        element.rect = match session.mode {
            DragMode::Move => before.moved_by(dx, dy),
            DragMode::Resize => before.resized_by(dx, dy, element.aspect_lock(canvas_ratio)),
        };
        element.rect != before
    }

    /// Ends the gesture. Returns whether a history entry was recorded.
    pub fn pointer_up(&mut self) -> bool {
        self.flush_frame();
        let EditorState::Dragging(session) = std::mem::replace(&mut self.state, EditorState::Idle)
        else {
            return false;
        };
        if !session.moved {
            return false;
        }
        debug!(
            "Committing {:?} gesture on element {}",
            session.mode, session.element_id
        );
        self.history.push(self.elements.clone());
        true
    }

    pub fn undo(&mut self) -> bool {
        if self.is_dragging() {
            return false;
        }
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.is_dragging() {
            return false;
        }
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Attaches a reference image and locks the element to its aspect.
    pub fn attach_image(
        &mut self,
        id: &str,
        image: Arc<str>,
        image_ratio: f64,
    ) -> Result<(), StudioError> {
        if !(image_ratio.is_finite() && image_ratio > 0.0) {
            return Err(StudioError::Validation(
                "Image ratio must be a positive number".to_string(),
            ));
        }
        self.require_idle()?;
        let canvas_ratio = self.canvas_ratio();
        let element = self.require_mut(id)?;
        element.image = Some(image);
        element.image_ratio = Some(image_ratio);
        element.rect = element.rect.with_aspect_lock(canvas_ratio, image_ratio);
        self.history.push(self.elements.clone());
        Ok(())
    }

    pub fn detach_image(&mut self, id: &str) -> Result<(), StudioError> {
        self.require_idle()?;
        let element = self.require_mut(id)?;
        if element.image.is_none() && element.image_ratio.is_none() {
            return Ok(());
        }
        element.image = None;
        element.image_ratio = None;
        self.history.push(self.elements.clone());
        Ok(())
    }

    /// Rasterizes the current layout. History is left untouched.
    pub fn confirm(&self, target_width: u32) -> LayoutConfirmation {
        LayoutConfirmation {
            mask: rasterize(&self.elements, self.canvas_ratio(), target_width),
            description: describe_layout(&self.elements),
        }
    }

    fn restore(&mut self, snapshot: Vec<LayoutElement>) {
        self.elements = snapshot;
        let still_present = self
            .selected
            .as_ref()
            .is_some_and(|id| self.elements.iter().any(|e| &e.id == id));
        if !still_present {
            self.selected = None;
        }
    }

    fn require(&self, id: &str) -> Result<&LayoutElement, StudioError> {
        self.element(id)
            .ok_or_else(|| StudioError::NotFound(format!("Layout element {}", id)))
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut LayoutElement, StudioError> {
        self.elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StudioError::NotFound(format!("Layout element {}", id)))
    }

    fn require_idle(&self) -> Result<(), StudioError> {
        if self.is_dragging() {
            return Err(StudioError::InvalidState(
                "Finish the current gesture first".to_string(),
            ));
        }
        Ok(())
    }
}

/// One line per element, in stacking order.
pub fn describe_layout(elements: &[LayoutElement]) -> String {
    elements
        .iter()
        .map(|e| {
            format!(
                "- {} ({}): {}, x {:.0}%, y {:.0}%, {:.0}% wide, {:.0}% tall",
                e.name,
                e.kind.theme().label,
                region_name(e),
                e.rect.x,
                e.rect.y,
                e.rect.width,
                e.rect.height
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn region_name(element: &LayoutElement) -> String {
    let (cx, cy) = element.rect.center();
    let third = CANVAS_EXTENT / 3.0;
    let vertical = if cy < third {
        "top"
    } else if cy < 2.0 * third {
        "middle"
    } else {
        "bottom"
    };
    let horizontal = if cx < third {
        "left"
    } else if cx < 2.0 * third {
        "center"
    } else {
        "right"
    };
    match (vertical, horizontal) {
        ("middle", "center") => "center".to_string(),
        (v, h) => format!("{}-{}", v, h),
    }
}

/// Appends the layout description to the generation prompt.
pub fn compose_final_prompt(base_prompt: &str, description: &str) -> String {
    if description.trim().is_empty() {
        return base_prompt.to_string();
    }
    format!(
        "{}\n\nLayout guide (match the attached color mask, do not render the mask itself):\n{}",
        base_prompt.trim_end(),
        description
    )
}
