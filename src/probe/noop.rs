//! No-op probe for when no probing tool is available

use super::{MediaProbe, ProbeTags};
use async_trait::async_trait;
use std::path::Path;

/// Reports empty tags for every file
///
/// Used when ffprobe is neither configured nor found in PATH, so listings still work and
/// simply lack titles.
pub struct NoOpProbe;

#[async_trait]
impl MediaProbe for NoOpProbe {
    async fn probe(&self, _file: &Path) -> crate::Result<ProbeTags> {
        Ok(ProbeTags::default())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
