//! Scratch memory needed by the matmul-based algorithms

use super::batch_info::BatchInfo;
use super::conv_type::ConvType;
use super::params::Conv2DParams;
use super::selector::Selector;
use super::{Algorithm, im2col, winograd};
use crate::dtype::Element;
use crate::error::{Error, Result};

/// Scratch requirements of a launch, in elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WorkspaceSize {
    /// Smallest workspace that lets the launch run, one image at a time
    pub required_size: usize,
    /// Workspace that processes the whole batch in one pass
    pub recommended_size: usize,
}

impl WorkspaceSize {
    /// Sizes for a launch with `fixed` elements shared by all images and
    /// `per_image` elements for each of `batch` images
    pub fn new(fixed: usize, per_image: usize, batch: usize) -> Self {
        Self {
            required_size: fixed + per_image,
            recommended_size: fixed + batch * per_image,
        }
    }
}

/// Workspace needed to run `algorithm` in direction `C`.
pub fn workspace_size<C: ConvType>(algorithm: Algorithm, params: &Conv2DParams) -> WorkspaceSize {
    match algorithm {
        Algorithm::Im2col => im2col::workspace_size::<C>(params),
        Algorithm::Winograd => winograd::workspace_size::<C>(params, false),
        Algorithm::WinogradLarge => winograd::workspace_size::<C>(params, true),
        Algorithm::Direct | Algorithm::Tiled | Algorithm::Matmul | Algorithm::NotSupported => {
            WorkspaceSize::default()
        }
    }
}

/// Workspace needed by the algorithm `selector` picks for direction `C`.
pub fn query_workspace_size<C: ConvType, S: Selector>(
    params: &Conv2DParams,
    selector: &mut S,
) -> WorkspaceSize {
    workspace_size::<C>(selector.select::<C>(params), params)
}

/// Workspace provided by the caller, or allocated by the launcher when the
/// caller passed none.
pub(crate) enum Scratch<'a, T> {
    Borrowed(&'a mut [T]),
    Owned(Vec<T>),
}

impl<'a, T: Element> Scratch<'a, T> {
    /// Use `workspace`, or allocate the recommended size when it is empty.
    pub fn acquire(workspace: &'a mut [T], size: WorkspaceSize) -> Result<Self> {
        if !workspace.is_empty() || size.required_size == 0 {
            if workspace.len() < size.required_size {
                return Err(Error::InsufficientWorkspace {
                    required: size.required_size,
                    available: workspace.len(),
                });
            }
            return Ok(Self::Borrowed(workspace));
        }

        let len = size.recommended_size;
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(len)
            .map_err(|_| Error::AllocationProblem { size: len })?;
        owned.resize(len, T::zero());
        log::trace!("allocated a workspace of {} elements", len);
        Ok(Self::Owned(owned))
    }

    /// Whether the launcher owns the memory and must wait before freeing it
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            Self::Borrowed(slice) => slice,
            Self::Owned(vec) => vec.as_mut_slice(),
        }
    }
}

/// Split `batch` images over a workspace of `available` elements.
pub(crate) fn plan_batches(
    available: usize,
    fixed: usize,
    per_image: usize,
    batch: usize,
) -> Result<BatchInfo> {
    let images = if per_image == 0 {
        batch
    } else {
        (available.saturating_sub(fixed) / per_image).min(batch)
    };
    if images == 0 {
        return Err(Error::InsufficientWorkspace {
            required: fixed + per_image,
            available,
        });
    }
    let info = BatchInfo::new(images, batch);
    log::debug!(
        "workspace of {} elements: {} minibatches of {} images (last {})",
        available,
        info.n_batches,
        info.images_per_batch,
        info.last_batch_size
    );
    Ok(info)
}
