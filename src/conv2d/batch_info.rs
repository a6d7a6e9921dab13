//! Splitting a batch into workspace-sized minibatches

/// How a batch is split into minibatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchInfo {
    /// Images in every minibatch but the last
    pub images_per_batch: usize,
    /// Number of minibatches
    pub n_batches: usize,
    /// Images in the last minibatch
    pub last_batch_size: usize,
}

impl BatchInfo {
    /// Split `batch` images into minibatches of at most `images_per_batch`.
    pub fn new(images_per_batch: usize, batch: usize) -> Self {
        let images_per_batch = images_per_batch.clamp(1, batch.max(1));
        let n_batches = batch.div_ceil(images_per_batch);
        let last_batch_size = batch - (n_batches.saturating_sub(1)) * images_per_batch;
        Self {
            images_per_batch,
            n_batches,
            last_batch_size,
        }
    }

    /// `(first image, image count)` of every minibatch
    pub fn minibatches(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n_batches).map(move |i| {
            let size = if i + 1 == self.n_batches {
                self.last_batch_size
            } else {
                self.images_per_batch
            };
            (i * self.images_per_batch, size)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_info() {
        let info = BatchInfo::new(3, 8);
        assert_eq!(info.n_batches, 3);
        assert_eq!(info.last_batch_size, 2);
        let chunks: Vec<_> = info.minibatches().collect();
        assert_eq!(chunks, vec![(0, 3), (3, 3), (6, 2)]);

        let whole = BatchInfo::new(10, 4);
        assert_eq!((whole.images_per_batch, whole.n_batches, whole.last_batch_size), (4, 1, 4));
    }
}
