use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use uuid::Uuid;

use crate::controller::{CanvasController, CanvasTopic};
use crate::error::{CanvasResult, DocumentError};
use crate::events::ObserverId;
use crate::io;

/// Single open document plus its save state.
pub struct Project {
    pub id: Uuid,
    pub controller: CanvasController,
    /// `None` for unsaved/untitled documents.
    pub path: Option<PathBuf>,
    /// Display name (derived from path or "Untitled-X")
    pub name: String,
    /// Set by history updates, cleared on save / autosave.
    dirty: Rc<Cell<bool>>,
    observer: ObserverId,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32) -> CanvasResult<Self> {
        let controller = CanvasController::new(width, height)?;
        Ok(Self::with_controller(format!("Untitled-{}", untitled_counter), controller))
    }

    pub fn with_controller(name: String, mut controller: CanvasController) -> Self {
        let dirty = Rc::new(Cell::new(false));
        let observer = ObserverId::new();
        let flag = Rc::clone(&dirty);
        controller
            .events()
            .subscribe(observer, CanvasTopic::History, move |_| flag.set(true));
        Self { id: Uuid::new_v4(), controller, path: None, name, dirty, observer }
    }

    /// Open a persisted document.
    pub async fn open(path: &Path) -> Result<Self, DocumentError> {
        let data = std::fs::read_to_string(path)?;
        let doc = io::deserialize(&data).await?;
        let mut project = Self::with_controller(file_name(path), CanvasController::with_document(doc));
        project.path = Some(path.to_path_buf());
        Ok(project)
    }

    /// Open `path`, or start a fresh `width`×`height` document if it cannot
    /// be read or decoded.
    pub fn load_or_default(path: &Path, width: u32, height: u32) -> CanvasResult<Self> {
        match pollster::block_on(Self::open(path)) {
            Ok(project) => Ok(project),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not load document, starting fresh");
                let mut project = Self::new_untitled(1, width, height)?;
                project.path = Some(path.to_path_buf());
                Ok(project)
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty.set(true);
    }

    pub fn mark_clean(&mut self) {
        self.dirty.set(false);
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = file_name(path);
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty() {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Serialized document if anything changed since the last save or
    /// autosave. Producing a payload marks the project clean.
    pub fn autosave_payload(&mut self) -> Result<Option<String>, DocumentError> {
        if !self.is_dirty() {
            return Ok(None);
        }
        let json = self.controller.serialize()?;
        self.mark_clean();
        Ok(Some(json))
    }

    pub fn save_as(&mut self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.controller.serialize()?)?;
        self.path = Some(path.to_path_buf());
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), DocumentError> {
        let path = self.path.clone().ok_or_else(|| {
            DocumentError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "project has no path"))
        })?;
        self.save_as(&path)
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        self.controller.events().remove_observer(self.observer);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
