//! Error types for the layer model.

use crate::id::{CanvasId, LayerId};
use thiserror::Error;

/// Structural errors: a caller asked for something the layer tree forbids.
///
/// These indicate a bug in the calling command and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    #[error("stale layer handle: {0:?}")]
    StaleLayer(LayerId),
    #[error("stale canvas handle: {0:?}")]
    StaleCanvas(CanvasId),
    #[error("layer {0:?} already has a parent")]
    AlreadyParented(LayerId),
    #[error("layer {0:?} has no parent")]
    NoParent(LayerId),
    #[error("layer {0:?} is the root of a canvas")]
    CanvasRoot(LayerId),
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("layer {child:?} is not a child of {parent:?}")]
    NotAChild { parent: LayerId, child: LayerId },
    #[error("layer {0:?} is not a composition layer")]
    NotAComposition(LayerId),
    #[error("layer {0:?} has the wrong kind for this operation")]
    WrongKind(LayerId),
    #[error("inserting {child:?} into {parent:?} would create a cycle")]
    Cycle { parent: LayerId, child: LayerId },
    #[error("layer {layer:?} is not on canvas {canvas:?}")]
    NotOnCanvas { layer: LayerId, canvas: CanvasId },
    #[error("layer {0:?} is still attached to a tree")]
    StillAttached(LayerId),
    #[error("layer {0:?} appears more than once in the batch")]
    Duplicate(LayerId),
    #[error("layers do not share a single parent")]
    MixedParents,
    #[error("operation needs at least one layer")]
    Empty,
    #[error("effect index {index} out of range (len {len})")]
    EffectOutOfRange { index: usize, len: usize },
}

/// Result type for structural layer operations.
pub type LayerResult<T> = Result<T, LayerError>;

/// Content errors: bad pixel data, undecodable images.
///
/// Callers degrade gracefully on these rather than aborting a whole pass.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("pixel buffer holds {actual} bytes, {width}x{height} RGBA needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("bitmap dimensions must be non-zero")]
    EmptyBitmap,
}

/// Result type for content operations.
pub type ContentResult<T> = Result<T, ContentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let id = LayerId::new(3, 1);
        assert!(LayerError::StaleLayer(id).to_string().contains("stale layer"));
        assert!(
            LayerError::IndexOutOfRange { index: 4, len: 2 }
                .to_string()
                .contains("index 4 out of range (len 2)")
        );
        let err = ContentError::BufferSize {
            width: 2,
            height: 2,
            expected: 16,
            actual: 3,
        };
        assert!(err.to_string().contains("needs 16"));
    }
}
