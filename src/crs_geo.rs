use std::rc::Rc;

use geo::{BoundingRect, CoordNum, Rect};
use proj::{Proj, Transform};
use shrinkwraprs::Shrinkwrap;

use crate::{errors::Result, intersection::Intersection};

/// Geometry tagged with the reference system its coordinates are in.
///
/// The crs is any definition [Proj] understands: `EPSG:4326`,
/// a PROJ string or the WKT reported by gdal.
#[derive(Shrinkwrap, Debug, Clone, PartialEq)]
pub struct CrsGeometry<G> {
    crs: Rc<str>,
    #[shrinkwrap(main_field)]
    geometry: G,
}

impl<G> CrsGeometry<G> {
    pub fn new(crs: impl Into<Rc<str>>, geometry: G) -> Self {
        Self {
            crs: crs.into(),
            geometry,
        }
    }

    pub fn crs(&self) -> &str {
        self.crs.as_ref()
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }
}

impl<G: Transform<f64, Output = G> + Clone> CrsGeometry<G> {
    pub fn with_crs(mut self, crs: &str) -> Result<Self> {
        if self.crs().ne(crs) {
            let proj = Proj::new_known_crs(self.crs(), crs, None)?;
            self.geometry.transform(&proj)?;
            self.crs = Rc::from(crs);
        }
        Ok(self)
    }

    /// Clones if crs is same.
    pub fn projected_geometry(&self, crs: &str) -> Result<G> {
        if self.crs().ne(crs) {
            let proj = Proj::new_known_crs(self.crs(), crs, None)?;
            Ok(self.geometry.transformed(&proj)?)
        } else {
            Ok(self.geometry.clone())
        }
    }
}

impl<G> CrsGeometry<G> {
    pub fn bounding_rect<T: CoordNum>(&self) -> Option<CrsGeometry<Rect<T>>>
    where
        G: BoundingRect<T>,
        G::Output: Into<Option<Rect<T>>>,
    {
        let geometry = self.geometry.bounding_rect().into()?;
        Some(CrsGeometry {
            crs: Rc::clone(&self.crs),
            geometry,
        })
    }
}

/// Intersection happens in the crs of `self`, `rhs` is reprojected first.
impl<G> Intersection for CrsGeometry<G>
where
    G: Intersection + Transform<f64, Output = G> + Clone,
{
    type Output = CrsGeometry<<G as Intersection>::Output>;
    fn intersection(&self, rhs: &Self) -> Result<Self::Output> {
        let rhs = rhs.projected_geometry(self.crs())?;
        let geometry = self.geometry.intersection(&rhs)?;
        Ok(CrsGeometry::new(Rc::clone(&self.crs), geometry))
    }
}
