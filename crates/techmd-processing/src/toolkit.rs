use std::sync::Arc;

use techmd_core::ToolPaths;

use crate::av::MediaInfoCharacterizer;
use crate::characterizer::{Characterizer, CharacterizerSet};
use crate::command::CommandRunner;
use crate::identifier::{Identifier, SiegfriedIdentifier};
use crate::image::ExifToolCharacterizer;
use crate::pdf::PopplerCharacterizer;

/// The identifier plus the characterizers consulted after it.
#[derive(Clone)]
pub struct Toolkit {
    pub identifier: Arc<dyn Identifier>,
    pub characterizers: CharacterizerSet,
}

impl Toolkit {
    pub fn new(identifier: Arc<dyn Identifier>, characterizers: CharacterizerSet) -> Self {
        Self {
            identifier,
            characterizers,
        }
    }

    /// Siegfried, then exiftool for images, poppler for PDFs and mediainfo
    /// for audio/video, all sharing `runner`.
    pub fn from_tools(tools: &ToolPaths, runner: Arc<dyn CommandRunner>) -> Self {
        let identifier = Arc::new(SiegfriedIdentifier::new(runner.clone(), &tools.siegfried));
        let characterizers: Vec<Arc<dyn Characterizer>> = vec![
            Arc::new(ExifToolCharacterizer::new(runner.clone(), &tools.exiftool)),
            Arc::new(PopplerCharacterizer::new(
                runner.clone(),
                &tools.pdfinfo,
                &tools.pdftotext,
            )),
            Arc::new(MediaInfoCharacterizer::new(
                runner,
                &tools.mediainfo,
                &tools.ffprobe,
                &tools.ffmpeg,
            )),
        ];
        Self::new(identifier, CharacterizerSet::new(characterizers))
    }
}

/// Hands out a [`Toolkit`] for each unit of work.
///
/// Adapters cache their tool version, so a long-running service builds a
/// fresh toolkit per task to pick up upgraded tools.
pub trait ToolkitFactory: Send + Sync {
    fn toolkit(&self) -> Toolkit;
}

/// Fixed adapters, shared by every caller.
impl ToolkitFactory for Toolkit {
    fn toolkit(&self) -> Toolkit {
        self.clone()
    }
}

/// Builds the configured tool adapters anew on every call.
#[derive(Clone)]
pub struct ToolkitBuilder {
    tools: ToolPaths,
    runner: Arc<dyn CommandRunner>,
}

impl ToolkitBuilder {
    pub fn new(tools: ToolPaths, runner: Arc<dyn CommandRunner>) -> Self {
        Self { tools, runner }
    }
}

impl ToolkitFactory for ToolkitBuilder {
    fn toolkit(&self) -> Toolkit {
        Toolkit::from_tools(&self.tools, self.runner.clone())
    }
}
