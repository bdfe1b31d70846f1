//! Pointer-driven state machine that creates, resizes and edits selections.
//!
//! The controller never owns the store; every call that may mutate takes it
//! by `&mut` so a caller can snapshot it between events.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::SlicerConfig;
use crate::error::InteractionError;
use crate::geometry::{CanvasPoint, CanvasRect, CoordinateMapper, ScreenPoint};
use crate::selection::{SelectionContent, SelectionEdit, SelectionId, SelectionKind, SelectionStore};

/// One of the eight grab points on the edited selection's outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    Tl,
    Tr,
    Bl,
    Br,
    Mt,
    Mb,
    Ml,
    Mr,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::Tl,
        Handle::Tr,
        Handle::Bl,
        Handle::Br,
        Handle::Mt,
        Handle::Mb,
        Handle::Ml,
        Handle::Mr,
    ];

    /// Position of the handle on `rect` in canvas pixels.
    pub fn position(&self, rect: CanvasRect) -> CanvasPoint {
        let left = rect.x;
        let top = rect.y;
        let right = rect.x + rect.width;
        let bottom = rect.y + rect.height;
        let mid_x = rect.x + rect.width / 2.0;
        let mid_y = rect.y + rect.height / 2.0;
        match self {
            Handle::Tl => CanvasPoint::new(left, top),
            Handle::Tr => CanvasPoint::new(right, top),
            Handle::Bl => CanvasPoint::new(left, bottom),
            Handle::Br => CanvasPoint::new(right, bottom),
            Handle::Mt => CanvasPoint::new(mid_x, top),
            Handle::Mb => CanvasPoint::new(mid_x, bottom),
            Handle::Ml => CanvasPoint::new(left, mid_y),
            Handle::Mr => CanvasPoint::new(right, mid_y),
        }
    }

    /// Move the edges this handle controls to `pointer`; the opposite edges
    /// stay where they were when the drag began.
    fn drag(&self, start: CanvasRect, pointer: CanvasPoint) -> CanvasRect {
        let mut left = start.x;
        let mut top = start.y;
        let mut right = start.x + start.width;
        let mut bottom = start.y + start.height;
        match self {
            Handle::Tl => {
                left = pointer.x;
                top = pointer.y;
            }
            Handle::Tr => {
                right = pointer.x;
                top = pointer.y;
            }
            Handle::Bl => {
                left = pointer.x;
                bottom = pointer.y;
            }
            Handle::Br => {
                right = pointer.x;
                bottom = pointer.y;
            }
            Handle::Mt => top = pointer.y,
            Handle::Mb => bottom = pointer.y,
            Handle::Ml => left = pointer.x,
            Handle::Mr => right = pointer.x,
        }
        CanvasRect::from_edges(left, top, right, bottom).normalized()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    Selecting {
        kind: SelectionKind,
        draft: Option<CanvasRect>,
    },
    Resizing {
        id: SelectionId,
        handle: Handle,
        start: CanvasRect,
    },
}

/// What a pointer event did, for callers that redraw or log.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    Ignored,
    DraftStarted,
    DraftUpdated(CanvasRect),
    Committed(SelectionId),
    /// Drag ended below the minimum size; nothing was stored.
    Discarded,
    ResizeStarted(SelectionId, Handle),
    Resized(SelectionId),
    ResizeFinished(SelectionId),
}

pub struct InteractionController {
    mapper: CoordinateMapper,
    state: InteractionState,
    editing: Option<SelectionId>,
    handle_radius: f64,
    min_drag: f64,
    slice_pending: bool,
}

impl InteractionController {
    pub fn new(mapper: CoordinateMapper, config: &SlicerConfig) -> Self {
        Self {
            mapper,
            state: InteractionState::Idle,
            editing: None,
            handle_radius: config.handle_radius,
            min_drag: config.min_drag,
            slice_pending: false,
        }
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut CoordinateMapper {
        &mut self.mapper
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn editing(&self) -> Option<SelectionId> {
        self.editing
    }

    /// In-progress rectangle in canvas pixels while creating a selection.
    pub fn draft(&self) -> Option<CanvasRect> {
        match &self.state {
            InteractionState::Selecting { draft, .. } => *draft,
            _ => None,
        }
    }

    /// Mark a slice as running. Starting one abandons any armed draw or
    /// resize gesture so nothing can land in the store until it finishes.
    pub fn set_slice_pending(&mut self, pending: bool) {
        self.slice_pending = pending;
        if pending && self.state != InteractionState::Idle {
            debug!("slice started: dropping {:?}", self.state);
            self.state = InteractionState::Idle;
        }
    }

    pub fn slice_pending(&self) -> bool {
        self.slice_pending
    }

    fn ensure_idle_store(&self) -> Result<(), InteractionError> {
        if self.slice_pending {
            return Err(InteractionError::SlicePending);
        }
        Ok(())
    }

    /// Arm the controller to draw a new selection; drops edit focus.
    pub fn new_selection(&mut self, kind: SelectionKind) -> Result<(), InteractionError> {
        self.ensure_idle_store()?;
        self.editing = None;
        self.state = InteractionState::Selecting { kind, draft: None };
        Ok(())
    }

    /// Focus a stored selection for editing. Unknown ids clear the focus.
    pub fn edit(&mut self, store: &SelectionStore, id: SelectionId) {
        self.editing = store.get(id).map(|s| s.id());
        let keep = match self.state {
            InteractionState::Resizing { id: resizing, .. } => self.editing == Some(resizing),
            InteractionState::Selecting { .. } => false,
            InteractionState::Idle => true,
        };
        if !keep {
            self.state = InteractionState::Idle;
        }
    }

    pub fn stop_editing(&mut self) {
        self.editing = None;
    }

    /// Apply a typed edit to the focused selection. A focus that no longer
    /// resolves is a no-op and returns `Ok(false)`.
    pub fn apply_edit(
        &mut self,
        store: &mut SelectionStore,
        edit: &SelectionEdit,
    ) -> Result<bool, InteractionError> {
        self.ensure_idle_store()?;
        let Some(id) = self.editing else {
            return Ok(false);
        };
        if store.get(id).is_none() {
            warn!("edit {} ignored: selection {id} no longer exists", edit.field_name());
            self.editing = None;
            return Ok(false);
        }
        Ok(store.update(id, edit)?)
    }

    pub fn delete(
        &mut self,
        store: &mut SelectionStore,
        id: SelectionId,
    ) -> Result<bool, InteractionError> {
        self.ensure_idle_store()?;
        if self.editing == Some(id) {
            self.editing = None;
        }
        if matches!(self.state, InteractionState::Resizing { id: r, .. } if r == id) {
            self.state = InteractionState::Idle;
        }
        Ok(store.delete(id).is_some())
    }

    /// Which handle of the edited selection, if any, lies under `point`.
    pub fn handle_at(&self, store: &SelectionStore, point: CanvasPoint) -> Option<Handle> {
        let sel = store.get(self.editing?)?;
        let rect = self.mapper.rect_to_canvas(sel.rect());
        Handle::ALL
            .into_iter()
            .find(|h| h.position(rect).distance(point) <= self.handle_radius)
    }

    pub fn pointer_down(
        &mut self,
        store: &SelectionStore,
        point: ScreenPoint,
    ) -> InteractionOutcome {
        if self.slice_pending {
            return InteractionOutcome::Ignored;
        }
        let p = self.mapper.screen_to_canvas(point);
        if let InteractionState::Selecting { draft, .. } = &mut self.state {
            *draft = Some(CanvasRect {
                x: p.x,
                y: p.y,
                width: 0.0,
                height: 0.0,
            });
            return InteractionOutcome::DraftStarted;
        }
        if self.state != InteractionState::Idle {
            return InteractionOutcome::Ignored;
        }

        let Some(handle) = self.handle_at(store, p) else {
            return InteractionOutcome::Ignored;
        };
        let Some(sel) = self.editing.and_then(|id| store.get(id)) else {
            return InteractionOutcome::Ignored;
        };
        let id = sel.id();
        let start = self.mapper.rect_to_canvas(sel.rect());
        debug!("resize {id} from {handle:?}");
        self.state = InteractionState::Resizing { id, handle, start };
        InteractionOutcome::ResizeStarted(id, handle)
    }

    pub fn pointer_move(
        &mut self,
        store: &mut SelectionStore,
        point: ScreenPoint,
    ) -> InteractionOutcome {
        let p = self.mapper.screen_to_canvas(point);
        let (id, handle, start) = match &mut self.state {
            InteractionState::Selecting {
                draft: Some(draft), ..
            } => {
                draft.width = p.x - draft.x;
                draft.height = p.y - draft.y;
                return InteractionOutcome::DraftUpdated(*draft);
            }
            InteractionState::Resizing { id, handle, start } => (*id, *handle, *start),
            _ => return InteractionOutcome::Ignored,
        };
        if self.slice_pending {
            return InteractionOutcome::Ignored;
        }

        let mut rect = self.mapper.rect_to_original(handle.drag(start, p));
        rect.width = rect.width.max(1);
        rect.height = rect.height.max(1);
        match store.update(id, &SelectionEdit::Rect(rect)) {
            Ok(true) => InteractionOutcome::Resized(id),
            Ok(false) => {
                self.state = InteractionState::Idle;
                InteractionOutcome::Ignored
            }
            Err(err) => {
                warn!("resize of {id} rejected: {err}");
                InteractionOutcome::Ignored
            }
        }
    }

    /// Finish the current gesture. Creation commits only drafts larger than
    /// the minimum drag in both directions (canvas pixels).
    pub fn pointer_up(&mut self, store: &mut SelectionStore) -> InteractionOutcome {
        match std::mem::replace(&mut self.state, InteractionState::Idle) {
            InteractionState::Selecting {
                kind,
                draft: Some(draft),
            } => {
                if self.slice_pending {
                    warn!("draft dropped: a slice is still running");
                    return InteractionOutcome::Discarded;
                }
                let draft = draft.normalized();
                if draft.width <= self.min_drag || draft.height <= self.min_drag {
                    debug!("discarding {}x{} draft", draft.width, draft.height);
                    return InteractionOutcome::Discarded;
                }
                let rect = self.mapper.rect_to_original(draft);
                match store.add(rect, SelectionContent::for_kind(kind)) {
                    Ok(id) => InteractionOutcome::Committed(id),
                    Err(err) => {
                        warn!("draft not committed: {err}");
                        InteractionOutcome::Discarded
                    }
                }
            }
            // no press yet: keep waiting for one
            state @ InteractionState::Selecting { draft: None, .. } => {
                self.state = state;
                InteractionOutcome::Ignored
            }
            InteractionState::Resizing { id, .. } => InteractionOutcome::ResizeFinished(id),
            InteractionState::Idle => InteractionOutcome::Ignored,
        }
    }

    /// Leaving the canvas ends a gesture the same way releasing does.
    pub fn pointer_leave(&mut self, store: &mut SelectionStore) -> InteractionOutcome {
        self.pointer_up(store)
    }

    /// Forget all gesture and focus state, e.g. after the image is replaced.
    pub fn reset(&mut self, mapper: CoordinateMapper) {
        self.mapper = mapper;
        self.state = InteractionState::Idle;
        self.editing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn controller(w: u32, h: u32) -> InteractionController {
        let config = SlicerConfig::default();
        let mapper = CoordinateMapper::new(w, h, config.display_width).unwrap();
        InteractionController::new(mapper, &config)
    }

    fn drag(
        ctl: &mut InteractionController,
        store: &mut SelectionStore,
        from: (f64, f64),
        to: (f64, f64),
    ) -> InteractionOutcome {
        ctl.pointer_down(store, ScreenPoint::new(from.0, from.1));
        ctl.pointer_move(store, ScreenPoint::new(to.0, to.1));
        ctl.pointer_up(store)
    }

    #[test]
    fn drag_commits_selection_in_original_pixels() {
        let mut ctl = controller(1280, 960);
        let mut store = SelectionStore::new();
        ctl.new_selection(SelectionKind::Link).unwrap();
        let outcome = drag(&mut ctl, &mut store, (10.0, 20.0), (110.0, 70.0));
        let InteractionOutcome::Committed(id) = outcome else {
            panic!("expected commit, got {outcome:?}");
        };
        assert_eq!(store.get(id).unwrap().rect(), Rect::new(20, 40, 200, 100));
        assert_eq!(ctl.state(), &InteractionState::Idle);
    }

    #[test]
    fn reverse_drag_is_normalized_before_commit() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        ctl.new_selection(SelectionKind::Replace).unwrap();
        drag(&mut ctl, &mut store, (100.0, 90.0), (40.0, 30.0));
        let sel = &store.as_slice()[0];
        assert_eq!(sel.rect(), Rect::new(40, 30, 60, 60));
        assert_eq!(sel.kind(), SelectionKind::Replace);
    }

    #[test]
    fn tiny_drags_are_discarded() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        ctl.new_selection(SelectionKind::Link).unwrap();
        let outcome = drag(&mut ctl, &mut store, (10.0, 10.0), (15.0, 40.0));
        assert_eq!(outcome, InteractionOutcome::Discarded);
        assert!(store.is_empty());
        assert_eq!(ctl.state(), &InteractionState::Idle);
    }

    #[test]
    fn release_without_press_keeps_selecting() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        ctl.new_selection(SelectionKind::Link).unwrap();
        assert_eq!(ctl.pointer_leave(&mut store), InteractionOutcome::Ignored);
        assert!(matches!(ctl.state(), InteractionState::Selecting { .. }));
    }

    #[test]
    fn css_scaled_pointer_is_corrected() {
        let mut ctl = controller(640, 480);
        ctl.mapper_mut().set_viewport(320.0, 240.0);
        let mut store = SelectionStore::new();
        ctl.new_selection(SelectionKind::Link).unwrap();
        drag(&mut ctl, &mut store, (10.0, 10.0), (60.0, 35.0));
        assert_eq!(store.as_slice()[0].rect(), Rect::new(20, 20, 100, 50));
    }

    #[test]
    fn corner_handle_moves_two_edges_live() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        let id = store
            .add(Rect::new(100, 100, 50, 40), SelectionContent::empty_link())
            .unwrap();
        ctl.edit(&store, id);

        let outcome = ctl.pointer_down(&store, ScreenPoint::new(151.0, 141.0));
        assert_eq!(outcome, InteractionOutcome::ResizeStarted(id, Handle::Br));

        ctl.pointer_move(&mut store, ScreenPoint::new(180.0, 160.0));
        assert_eq!(store.get(id).unwrap().rect(), Rect::new(100, 100, 80, 60));
        ctl.pointer_move(&mut store, ScreenPoint::new(200.0, 170.0));
        assert_eq!(store.get(id).unwrap().rect(), Rect::new(100, 100, 100, 70));

        assert_eq!(ctl.pointer_up(&mut store), InteractionOutcome::ResizeFinished(id));
        assert_eq!(ctl.editing(), Some(id));
    }

    #[test]
    fn edge_handle_moves_one_edge_and_flips_past_opposite() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        let id = store
            .add(Rect::new(100, 100, 50, 40), SelectionContent::empty_link())
            .unwrap();
        ctl.edit(&store, id);

        assert_eq!(
            ctl.pointer_down(&store, ScreenPoint::new(100.0, 120.0)),
            InteractionOutcome::ResizeStarted(id, Handle::Ml)
        );
        ctl.pointer_move(&mut store, ScreenPoint::new(170.0, 5.0));
        assert_eq!(store.get(id).unwrap().rect(), Rect::new(150, 100, 20, 40));
    }

    #[test]
    fn every_handle_leaves_opposite_edges_in_place() {
        // (handle, left, top, right, bottom) after dragging 4.75 canvas px up-left
        let cases = [
            (Handle::Tl, 91, 91, 150, 140),
            (Handle::Tr, 100, 91, 141, 140),
            (Handle::Bl, 91, 100, 150, 131),
            (Handle::Br, 100, 100, 141, 131),
            (Handle::Mt, 100, 91, 150, 140),
            (Handle::Mb, 100, 100, 150, 131),
            (Handle::Ml, 91, 100, 150, 140),
            (Handle::Mr, 100, 100, 141, 140),
        ];
        for (handle, left, top, right, bottom) in cases {
            let mut ctl = controller(1280, 960);
            let mut store = SelectionStore::new();
            let id = store
                .add(Rect::new(100, 100, 50, 40), SelectionContent::empty_link())
                .unwrap();
            ctl.edit(&store, id);

            let at = handle.position(ctl.mapper().rect_to_canvas(store.get(id).unwrap().rect()));
            assert_eq!(
                ctl.pointer_down(&store, ScreenPoint::new(at.x, at.y)),
                InteractionOutcome::ResizeStarted(id, handle)
            );
            ctl.pointer_move(&mut store, ScreenPoint::new(at.x - 4.75, at.y - 4.75));
            let rect = store.get(id).unwrap().rect();
            assert_eq!(
                (rect.x, rect.y, rect.right(), rect.bottom()),
                (left, top, right, bottom),
                "{handle:?}"
            );
        }
    }

    #[test]
    fn focusing_another_selection_ends_the_resize() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        let a = store
            .add(Rect::new(100, 100, 50, 40), SelectionContent::empty_link())
            .unwrap();
        let b = store
            .add(Rect::new(300, 300, 20, 20), SelectionContent::empty_link())
            .unwrap();
        ctl.edit(&store, a);
        ctl.pointer_down(&store, ScreenPoint::new(150.0, 140.0));
        assert!(matches!(ctl.state(), InteractionState::Resizing { .. }));

        ctl.edit(&store, b);
        assert_eq!(ctl.state(), &InteractionState::Idle);
        assert_eq!(
            ctl.pointer_move(&mut store, ScreenPoint::new(200.0, 200.0)),
            InteractionOutcome::Ignored
        );
        assert_eq!(store.get(a).unwrap().rect(), Rect::new(100, 100, 50, 40));

        ctl.pointer_down(&store, ScreenPoint::new(320.0, 320.0));
        ctl.edit(&store, b);
        assert!(matches!(ctl.state(), InteractionState::Resizing { id, .. } if *id == b));
    }

    #[test]
    fn draw_armed_before_a_slice_cannot_commit() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        ctl.new_selection(SelectionKind::Link).unwrap();
        ctl.pointer_down(&store, ScreenPoint::new(10.0, 10.0));
        ctl.set_slice_pending(true);
        assert_eq!(ctl.state(), &InteractionState::Idle);
        assert_eq!(
            ctl.pointer_move(&mut store, ScreenPoint::new(200.0, 200.0)),
            InteractionOutcome::Ignored
        );
        assert_eq!(ctl.pointer_up(&mut store), InteractionOutcome::Ignored);
        assert!(store.is_empty());
    }

    #[test]
    fn pointer_down_away_from_handles_does_nothing() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        let id = store
            .add(Rect::new(100, 100, 50, 40), SelectionContent::empty_link())
            .unwrap();
        ctl.edit(&store, id);
        assert_eq!(
            ctl.pointer_down(&store, ScreenPoint::new(125.0, 120.0)),
            InteractionOutcome::Ignored
        );
        assert_eq!(ctl.state(), &InteractionState::Idle);
    }

    #[test]
    fn deleting_edited_selection_clears_focus_but_others_keep_it() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        let a = store.add(Rect::new(0, 0, 10, 10), SelectionContent::empty_link()).unwrap();
        let b = store.add(Rect::new(20, 0, 10, 10), SelectionContent::empty_link()).unwrap();

        ctl.edit(&store, b);
        assert!(ctl.delete(&mut store, a).unwrap());
        assert_eq!(ctl.editing(), Some(b));
        assert!(ctl
            .apply_edit(&mut store, &SelectionEdit::Url("http://b".into()))
            .unwrap());
        assert_eq!(store.get(b).unwrap().link_url(), Some("http://b"));

        assert!(ctl.delete(&mut store, b).unwrap());
        assert_eq!(ctl.editing(), None);
        assert!(!ctl.apply_edit(&mut store, &SelectionEdit::X(3)).unwrap());
    }

    #[test]
    fn new_selection_drops_edit_focus() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        let a = store.add(Rect::new(0, 0, 10, 10), SelectionContent::empty_link()).unwrap();
        ctl.edit(&store, a);
        ctl.new_selection(SelectionKind::Link).unwrap();
        assert_eq!(ctl.editing(), None);
    }

    #[test]
    fn pending_slice_rejects_mutations() {
        let mut ctl = controller(640, 480);
        let mut store = SelectionStore::new();
        let a = store.add(Rect::new(0, 0, 10, 10), SelectionContent::empty_link()).unwrap();
        ctl.set_slice_pending(true);
        assert_eq!(
            ctl.new_selection(SelectionKind::Link),
            Err(InteractionError::SlicePending)
        );
        assert_eq!(ctl.delete(&mut store, a), Err(InteractionError::SlicePending));
        ctl.set_slice_pending(false);
        assert!(ctl.new_selection(SelectionKind::Link).is_ok());
    }
}
