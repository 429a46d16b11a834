use crate::payload::{ImageData, ImageryHandle};

/// Spare [`ImageryHandle`]s kept around so installs can refresh existing texel storage instead of allocating.
#[derive(Debug, Default)]
pub struct ImageryPool {
    free: Vec<ImageryHandle>,
    target: usize,
}

impl ImageryPool {
    pub fn new(target: usize) -> Self {
        Self {
            free: Vec::with_capacity(target),
            target,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Keeps `handle` for reuse. The pool may exceed its target until the next [`ImageryPool::trim`].
    pub fn recycle(&mut self, handle: ImageryHandle) {
        self.free.push(handle);
    }

    pub fn take(&mut self) -> Option<ImageryHandle> {
        self.free.pop()
    }

    /// Produces the handle to install for `image`, given the handle it replaces (if any).
    pub fn install(&mut self, image: &ImageData, previous: Option<ImageryHandle>) -> ImageryHandle {
        let mut handle = match (self.take(), previous) {
            (Some(pooled), previous) => {
                if let Some(previous) = previous {
                    self.recycle(previous);
                }
                pooled
            }
            (None, Some(previous)) => previous,
            (None, None) => return ImageryHandle::new(image.clone()),
        };
        handle.refresh(image);
        handle
    }

    /// Drops spare handles beyond the target size. Returns how many were released.
    pub fn trim(&mut self) -> usize {
        let excess = self.free.len().saturating_sub(self.target);
        self.free.truncate(self.target);
        excess
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    fn image(fill: u8) -> ImageData {
        ImageData::new(2, 2, vec![fill; 16])
    }

    #[test]
    fn install_prefers_pooled_handles() {
        let mut pool = ImageryPool::new(2);

        let fresh = pool.install(&image(1), None);
        assert_eq!(fresh.generation(), 0);

        // Replacing without spares refreshes the previous handle.
        let refreshed = pool.install(&image(2), Some(fresh));
        assert_eq!(refreshed.generation(), 1);
        assert_eq!(refreshed.texels(), &[2; 16]);

        pool.recycle(ImageryHandle::new(image(3)));
        let pooled = pool.install(&image(4), Some(refreshed));
        assert_eq!(pooled.generation(), 1);
        assert_eq!(pooled.texels(), &[4; 16]);
        // The replaced handle took the pooled one's place.
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn trim_to_target() {
        let mut pool = ImageryPool::new(1);
        for _ in 0..3 {
            pool.recycle(ImageryHandle::new(image(0)));
        }
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.trim(), 2);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.trim(), 0);
        pool.clear();
        assert!(pool.is_empty());
    }
}
