use crate::glam::Vec3A;

/// An axis-aligned box, stored as inclusive `minimum` and `maximum` corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub minimum: Vec3A,
    pub maximum: Vec3A,
}

impl Aabb {
    pub fn new(minimum: Vec3A, maximum: Vec3A) -> Self {
        Self { minimum, maximum }
    }

    /// The smallest box containing every point, or `None` if there are no points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3A>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |aabb, p| {
            Self::new(aabb.minimum.min(p), aabb.maximum.max(p))
        }))
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

    #[test]
    fn bounds_of_points() {
        assert_eq!(Aabb::from_points(std::iter::empty()), None);

        let aabb = Aabb::from_points([
            Vec3A::new(1.0, -2.0, 0.0),
            Vec3A::new(-1.0, 4.0, 3.0),
            Vec3A::new(0.0, 0.0, -5.0),
        ])
        .unwrap();
        assert_eq!(aabb.minimum, Vec3A::new(-1.0, -2.0, -5.0));
        assert_eq!(aabb.maximum, Vec3A::new(1.0, 4.0, 3.0));
    }
}
