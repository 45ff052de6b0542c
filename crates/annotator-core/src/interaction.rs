//! Interaction state machine
//!
//! Turns pointer and keyboard events into store mutations. At most one
//! gesture is live at a time:
//!
//! - `DrawingBox`: a rubber-band rectangle in box mode
//! - `PlacingText`: the single text edit session, new or inline
//! - `DraggingAnnotation`: moving an existing text annotation
//!
//! Pointer coordinates are screen pixels relative to the top-left corner of
//! the page element. Move and up events are interpreted relative to the
//! page the gesture started on, wherever the pointer actually is, so a
//! gesture always ends on the next pointer-up.

use crate::config::AnnotatorConfig;
use crate::coords::{round1, Point, ScreenRect, Viewport};
use crate::forms::FormFieldDescriptor;
use crate::page::MediaBox;
use crate::store::{AnnotationId, AnnotationStore, TextAnnotation, TextPatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Width of one character as a fraction of the font size, used to size the
/// hit region of a text annotation
const CHAR_WIDTH_EM: f64 = 0.6;
const LINE_HEIGHT_EM: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    #[default]
    Box,
    Text,
}

impl FromStr for ToolMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "box" => Ok(ToolMode::Box),
            "text" => Ok(ToolMode::Text),
            other => Err(format!("Unknown tool mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
    Escape,
    Other,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Backspace" => Key::Backspace,
            "Enter" => Key::Enter,
            "Escape" | "Esc" => Key::Escape,
            _ => {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Other,
                }
            }
        }
    }
}

/// What an event did, for the UI to react to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Outcome {
    Ignored,
    /// The pointer landed on a form field; its own widget handles it
    DeferredToField(String),
    DrawStarted,
    PreviewChanged,
    BoxCommitted(AnnotationId),
    BoxDiscarded,
    EditStarted,
    BufferChanged,
    TextCommitted(AnnotationId),
    TextUpdated(AnnotationId),
    TextDiscarded,
    DragStarted(AnnotationId),
    TextMoved(AnnotationId),
    DragEnded(AnnotationId),
}

/// Everything a gesture may read or mutate
pub struct InteractionContext<'a> {
    pub store: &'a mut AnnotationStore,
    pub viewport: Viewport,
    pub fields: &'a [FormFieldDescriptor],
    pub media_boxes: &'a BTreeMap<u32, MediaBox>,
    pub config: &'a AnnotatorConfig,
}

/// Hit region of a text annotation on the rendered page
pub fn text_region(t: &TextAnnotation, viewport: &Viewport) -> ScreenRect {
    let chars = t.text.chars().count() as f64;
    let width = (chars * CHAR_WIDTH_EM * t.font_size).max(t.font_size);
    let origin = viewport.page_to_screen(Point::new(t.x, t.y));
    ScreenRect {
        x: origin.x,
        y: origin.y,
        width: width * viewport.scale,
        height: t.font_size * LINE_HEIGHT_EM * viewport.scale,
    }
}

/// Widget region of a placed form field on the rendered page
pub fn field_region(
    field: &FormFieldDescriptor,
    media_boxes: &BTreeMap<u32, MediaBox>,
    viewport: &Viewport,
) -> Option<ScreenRect> {
    let page = field.page?;
    let rect = field.rect?;
    let mb = media_boxes.get(&page).copied().unwrap_or_default();
    Some(mb.rect_to_screen(rect, viewport))
}

/// A pointer gesture that keeps receiving move and up events after it
/// starts, until it ends or is cancelled
pub trait DragSession: Sized {
    fn on_move(&mut self, ctx: &mut InteractionContext<'_>, point: Point) -> Outcome;
    fn end(self, ctx: &mut InteractionContext<'_>, point: Point) -> Outcome;
    fn cancel(self, ctx: &mut InteractionContext<'_>) -> Outcome;
}

/// Rubber-band rectangle, kept in screen space until it is committed
#[derive(Debug, Clone, PartialEq)]
pub struct BoxDraft {
    pub page: u32,
    pub origin: Point,
    pub current: Point,
}

impl BoxDraft {
    pub fn start(page: u32, origin: Point) -> Self {
        Self {
            page,
            origin,
            current: origin,
        }
    }

    pub fn preview(&self) -> ScreenRect {
        ScreenRect::from_corners(self.origin, self.current)
    }

    /// Unscaled `[x1, y1, x2, y2]` of the draft, or `None` when it is too
    /// small to keep
    fn coords(&self, viewport: &Viewport, min_px: f64) -> Option<[f64; 4]> {
        let r = self.preview();
        if r.width < min_px || r.height < min_px {
            return None;
        }
        let top_left = viewport.screen_to_page(Point::new(r.x, r.y));
        let bottom_right = viewport.screen_to_page(Point::new(r.x + r.width, r.y + r.height));
        let coords = [
            round1(top_left.x),
            round1(top_left.y),
            round1(bottom_right.x),
            round1(bottom_right.y),
        ];
        (coords[2] > coords[0] && coords[3] > coords[1]).then_some(coords)
    }
}

impl DragSession for BoxDraft {
    fn on_move(&mut self, _ctx: &mut InteractionContext<'_>, point: Point) -> Outcome {
        self.current = point;
        Outcome::PreviewChanged
    }

    fn end(mut self, ctx: &mut InteractionContext<'_>, point: Point) -> Outcome {
        self.current = point;
        match self.coords(&ctx.viewport, ctx.config.min_box_px) {
            Some(coords) => {
                let label = format!("Box {}", ctx.store.boxes().len() + 1);
                let id = ctx.store.add_box(coords, Some(label), self.page);
                tracing::debug!("Committed box {} on page {}: {:?}", id, self.page, coords);
                Outcome::BoxCommitted(id)
            }
            None => {
                tracing::debug!("Discarded box draft below threshold");
                Outcome::BoxDiscarded
            }
        }
    }

    fn cancel(self, _ctx: &mut InteractionContext<'_>) -> Outcome {
        Outcome::BoxDiscarded
    }
}

/// Move of an existing text annotation. The grab offset is kept so the
/// annotation does not jump to the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDrag {
    pub id: AnnotationId,
    pub page: u32,
    pub grab_offset: Point,
}

impl TextDrag {
    pub fn start(t: &TextAnnotation, pointer: Point) -> Self {
        Self {
            id: t.id.clone(),
            page: t.page,
            grab_offset: Point::new(pointer.x - t.x, pointer.y - t.y),
        }
    }

    fn move_to(&self, ctx: &mut InteractionContext<'_>, point: Point) -> bool {
        let p = ctx.viewport.screen_to_page(point);
        ctx.store.update_text(
            &self.id,
            TextPatch::position(p.x - self.grab_offset.x, p.y - self.grab_offset.y),
        )
    }
}

impl DragSession for TextDrag {
    fn on_move(&mut self, ctx: &mut InteractionContext<'_>, point: Point) -> Outcome {
        if self.move_to(ctx, point) {
            Outcome::TextMoved(self.id.clone())
        } else {
            Outcome::Ignored
        }
    }

    fn end(self, ctx: &mut InteractionContext<'_>, point: Point) -> Outcome {
        self.move_to(ctx, point);
        tracing::debug!("Finished dragging text annotation {}", self.id);
        Outcome::DragEnded(self.id)
    }

    fn cancel(self, _ctx: &mut InteractionContext<'_>) -> Outcome {
        Outcome::DragEnded(self.id)
    }
}

/// The one live text edit. `target` is set when an existing annotation is
/// being edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEdit {
    pub page: u32,
    /// Unscaled top-left position
    pub position: Point,
    pub buffer: String,
    pub target: Option<AnnotationId>,
}

impl TextEdit {
    fn commit(self, ctx: &mut InteractionContext<'_>) -> Outcome {
        if self.buffer.trim().is_empty() {
            tracing::debug!("Discarded empty text edit");
            return Outcome::TextDiscarded;
        }
        match self.target {
            Some(id) => {
                if ctx.store.update_text(&id, TextPatch::text(self.buffer)) {
                    Outcome::TextUpdated(id)
                } else {
                    Outcome::TextDiscarded
                }
            }
            None => {
                let id = ctx.store.add_text(
                    self.position.x,
                    self.position.y,
                    self.buffer,
                    ctx.config.default_font_size,
                    self.page,
                );
                tracing::debug!("Committed text annotation {} on page {}", id, self.page);
                Outcome::TextCommitted(id)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum InteractionState {
    #[default]
    Idle,
    DrawingBox(BoxDraft),
    PlacingText(TextEdit),
    DraggingAnnotation(TextDrag),
}

enum Hit {
    Field(String),
    Text(TextAnnotation),
    Empty,
}

#[derive(Debug, Default)]
pub struct InteractionMachine {
    mode: ToolMode,
    state: InteractionState,
}

impl InteractionMachine {
    pub fn new(mode: ToolMode) -> Self {
        Self {
            mode,
            state: InteractionState::Idle,
        }
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == InteractionState::Idle
    }

    /// Live rubber-band rectangle, if a box is being drawn
    pub fn preview(&self) -> Option<(u32, ScreenRect)> {
        match &self.state {
            InteractionState::DrawingBox(draft) => Some((draft.page, draft.preview())),
            _ => None,
        }
    }

    pub fn edit_session(&self) -> Option<&TextEdit> {
        match &self.state {
            InteractionState::PlacingText(edit) => Some(edit),
            _ => None,
        }
    }

    /// Switch tools. Any live gesture is cancelled, an open edit discarded.
    pub fn set_mode(&mut self, ctx: &mut InteractionContext<'_>, mode: ToolMode) -> Outcome {
        let outcome = self.cancel(ctx);
        self.mode = mode;
        tracing::debug!("Tool mode set to {:?}", mode);
        outcome
    }

    /// Abandon whatever is live and return to idle
    pub fn cancel(&mut self, ctx: &mut InteractionContext<'_>) -> Outcome {
        match std::mem::take(&mut self.state) {
            InteractionState::Idle => Outcome::Ignored,
            InteractionState::DrawingBox(draft) => draft.cancel(ctx),
            InteractionState::DraggingAnnotation(drag) => drag.cancel(ctx),
            InteractionState::PlacingText(_) => Outcome::TextDiscarded,
        }
    }

    /// Drop any gesture that refers to an annotation that is going away
    pub fn forget(&mut self, id: &str) {
        let refers = match &self.state {
            InteractionState::DraggingAnnotation(drag) => drag.id == id,
            InteractionState::PlacingText(edit) => edit.target.as_deref() == Some(id),
            _ => false,
        };
        if refers {
            self.state = InteractionState::Idle;
        }
    }

    /// Pointer pressed on `page`. A live text edit is committed first, as
    /// if it lost focus, so the result may hold two outcomes.
    pub fn pointer_down(
        &mut self,
        ctx: &mut InteractionContext<'_>,
        page: u32,
        point: Point,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        match std::mem::take(&mut self.state) {
            InteractionState::Idle => {}
            InteractionState::PlacingText(edit) => outcomes.push(edit.commit(ctx)),
            // A press without a matching release: the old gesture is stale
            InteractionState::DrawingBox(draft) => outcomes.push(draft.cancel(ctx)),
            InteractionState::DraggingAnnotation(drag) => outcomes.push(drag.cancel(ctx)),
        }

        let outcome = match self.hit_test(ctx, page, point) {
            Hit::Field(name) => {
                tracing::debug!("Pointer on form field {}, deferring", name);
                Outcome::DeferredToField(name)
            }
            Hit::Text(t) => {
                let pointer = ctx.viewport.screen_to_page(point);
                let drag = TextDrag::start(&t, pointer);
                let id = drag.id.clone();
                self.state = InteractionState::DraggingAnnotation(drag);
                Outcome::DragStarted(id)
            }
            Hit::Empty => match self.mode {
                ToolMode::Box => {
                    self.state = InteractionState::DrawingBox(BoxDraft::start(page, point));
                    Outcome::DrawStarted
                }
                ToolMode::Text => {
                    self.state = InteractionState::PlacingText(TextEdit {
                        page,
                        position: ctx.viewport.screen_to_page(point),
                        buffer: String::new(),
                        target: None,
                    });
                    Outcome::EditStarted
                }
            },
        };
        outcomes.push(outcome);
        outcomes
    }

    pub fn pointer_move(&mut self, ctx: &mut InteractionContext<'_>, point: Point) -> Outcome {
        match &mut self.state {
            InteractionState::DrawingBox(draft) => draft.on_move(ctx, point),
            InteractionState::DraggingAnnotation(drag) => drag.on_move(ctx, point),
            _ => Outcome::Ignored,
        }
    }

    /// Pointer released anywhere. Ends a box draw or a drag; a text edit
    /// stays open.
    pub fn pointer_up(&mut self, ctx: &mut InteractionContext<'_>, point: Point) -> Outcome {
        match std::mem::take(&mut self.state) {
            InteractionState::DrawingBox(draft) => draft.end(ctx, point),
            InteractionState::DraggingAnnotation(drag) => drag.end(ctx, point),
            other => {
                self.state = other;
                Outcome::Ignored
            }
        }
    }

    pub fn key(&mut self, ctx: &mut InteractionContext<'_>, key: Key) -> Outcome {
        match (std::mem::take(&mut self.state), key) {
            (InteractionState::PlacingText(mut edit), key) => match key {
                Key::Char(c) => {
                    edit.buffer.push(c);
                    self.state = InteractionState::PlacingText(edit);
                    Outcome::BufferChanged
                }
                Key::Backspace => {
                    edit.buffer.pop();
                    self.state = InteractionState::PlacingText(edit);
                    Outcome::BufferChanged
                }
                Key::Enter => edit.commit(ctx),
                Key::Escape => {
                    tracing::debug!("Text edit cancelled");
                    Outcome::TextDiscarded
                }
                Key::Other => {
                    self.state = InteractionState::PlacingText(edit);
                    Outcome::Ignored
                }
            },
            (InteractionState::DrawingBox(draft), Key::Escape) => draft.cancel(ctx),
            (InteractionState::DraggingAnnotation(drag), Key::Escape) => drag.cancel(ctx),
            (other, _) => {
                self.state = other;
                Outcome::Ignored
            }
        }
    }

    /// Open the edit session on an existing text annotation, pre-filled
    /// with its text
    pub fn begin_edit(&mut self, ctx: &mut InteractionContext<'_>, id: &str) -> Vec<Outcome> {
        let Some(t) = ctx.store.get_text(id).cloned() else {
            return vec![Outcome::Ignored];
        };
        let mut outcomes = Vec::new();
        match std::mem::take(&mut self.state) {
            InteractionState::Idle => {}
            InteractionState::PlacingText(edit) => outcomes.push(edit.commit(ctx)),
            InteractionState::DrawingBox(draft) => outcomes.push(draft.cancel(ctx)),
            InteractionState::DraggingAnnotation(drag) => outcomes.push(drag.cancel(ctx)),
        }
        // The commit above may have been an edit of this very annotation
        let t = ctx.store.get_text(id).cloned().unwrap_or(t);
        self.state = InteractionState::PlacingText(TextEdit {
            page: t.page,
            position: Point::new(t.x, t.y),
            buffer: t.text,
            target: Some(t.id),
        });
        outcomes.push(Outcome::EditStarted);
        outcomes
    }

    /// Form fields win over text annotations, which win over empty canvas.
    /// Text annotations are only hit in text mode.
    fn hit_test(&self, ctx: &InteractionContext<'_>, page: u32, point: Point) -> Hit {
        let field = ctx
            .fields
            .iter()
            .filter(|f| f.page == Some(page))
            .find(|f| {
                field_region(f, ctx.media_boxes, &ctx.viewport)
                    .map(|r| r.contains(point))
                    .unwrap_or(false)
            });
        if let Some(field) = field {
            return Hit::Field(field.name.clone());
        }

        if self.mode == ToolMode::Text {
            // Last added is drawn on top
            let text = ctx
                .store
                .texts_on_page(page)
                .filter(|t| text_region(t, &ctx.viewport).contains(point))
                .last();
            if let Some(t) = text {
                return Hit::Text(t.clone());
            }
        }
        Hit::Empty
    }
}
