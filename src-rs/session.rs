//! One editing session: a loaded image, its selections, the pointer
//! controller and at most one slice running in the background.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info};

use crate::config::SlicerConfig;
use crate::error::{ConfigError, InteractionError, SliceError};
use crate::geometry::{CoordinateMapper, ScreenPoint};
use crate::interaction::{InteractionController, InteractionOutcome};
use crate::raster::RasterSource;
use crate::selection::{SelectionEdit, SelectionId, SelectionKind, SelectionStore};
use crate::slice::{slice, SliceOutput};

pub struct Session {
    raster: Arc<dyn RasterSource>,
    base_name: String,
    config: SlicerConfig,
    store: SelectionStore,
    controller: InteractionController,
    pending: Option<JoinHandle<Result<SliceOutput, SliceError>>>,
}

impl Session {
    pub fn new(
        raster: Arc<dyn RasterSource>,
        base_name: impl Into<String>,
        config: SlicerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (width, height) = raster.dimensions();
        let mapper = CoordinateMapper::new(width, height, config.display_width)?;
        let controller = InteractionController::new(mapper, &config);
        Ok(Self {
            raster,
            base_name: base_name.into(),
            config,
            store: SelectionStore::new(),
            controller,
            pending: None,
        })
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn config(&self) -> &SlicerConfig {
        &self.config
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Seed the store, e.g. from a project file. Replaces existing selections.
    pub fn load_selections(&mut self, store: SelectionStore) -> Result<(), InteractionError> {
        self.guard()?;
        self.store = store;
        self.controller.stop_editing();
        Ok(())
    }

    /// Swap in a new image. Selections and focus are cleared.
    pub fn replace_image(
        &mut self,
        raster: Arc<dyn RasterSource>,
        base_name: impl Into<String>,
    ) -> Result<(), SliceError> {
        self.guard()?;
        let (width, height) = raster.dimensions();
        let mapper = CoordinateMapper::new(width, height, self.config.display_width)
            .map_err(|_| SliceError::EmptyImage { width, height })?;
        self.raster = raster;
        self.base_name = base_name.into();
        self.store.clear();
        self.controller.reset(mapper);
        info!("loaded {}x{} image as {:?}", width, height, self.base_name);
        Ok(())
    }

    fn guard(&self) -> Result<(), InteractionError> {
        if self.pending.is_some() {
            return Err(InteractionError::SlicePending);
        }
        Ok(())
    }

    pub fn set_viewport(&mut self, css_width: f64, css_height: f64) {
        self.controller.mapper_mut().set_viewport(css_width, css_height);
    }

    pub fn new_selection(&mut self, kind: SelectionKind) -> Result<(), InteractionError> {
        self.controller.new_selection(kind)
    }

    pub fn edit(&mut self, id: SelectionId) {
        self.controller.edit(&self.store, id);
    }

    pub fn stop_editing(&mut self) {
        self.controller.stop_editing();
    }

    pub fn apply_edit(&mut self, edit: &SelectionEdit) -> Result<bool, InteractionError> {
        self.controller.apply_edit(&mut self.store, edit)
    }

    pub fn delete(&mut self, id: SelectionId) -> Result<bool, InteractionError> {
        self.controller.delete(&mut self.store, id)
    }

    pub fn pointer_down(&mut self, point: ScreenPoint) -> InteractionOutcome {
        self.controller.pointer_down(&self.store, point)
    }

    pub fn pointer_move(&mut self, point: ScreenPoint) -> InteractionOutcome {
        self.controller.pointer_move(&mut self.store, point)
    }

    pub fn pointer_up(&mut self) -> InteractionOutcome {
        self.controller.pointer_up(&mut self.store)
    }

    pub fn pointer_leave(&mut self) -> InteractionOutcome {
        self.controller.pointer_leave(&mut self.store)
    }

    pub fn is_slicing(&self) -> bool {
        self.pending.is_some()
    }

    /// Start slicing a snapshot of the current selections on a worker
    /// thread. Selection changes are refused until [`Session::finish_slice`].
    pub fn start_slice(&mut self) -> Result<(), InteractionError> {
        self.guard()?;
        let snapshot = self.store.snapshot();
        let raster = Arc::clone(&self.raster);
        let base = self.base_name.clone();
        let config = self.config.clone();
        debug!("slicing {} selection(s) in the background", snapshot.len());
        self.pending = Some(thread::spawn(move || {
            slice(raster.as_ref(), &snapshot, &base, &config)
        }));
        self.controller.set_slice_pending(true);
        Ok(())
    }

    /// Wait for the running slice and return its output.
    pub fn finish_slice(&mut self) -> Result<SliceOutput, SliceError> {
        let handle = self.pending.take().ok_or(SliceError::NothingPending)?;
        let result = handle.join().map_err(|_| SliceError::WorkerPanicked);
        self.controller.set_slice_pending(false);
        result?
    }

    pub fn slice_now(&mut self) -> Result<SliceOutput, SliceError> {
        self.start_slice()?;
        self.finish_slice()
    }
}
