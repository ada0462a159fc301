use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    algorithms::Algorithm,
    components::{
        backends::gdal_backend::{LocalImage, PlanetScene},
        bounds::PixelCorners,
        file::DatasetSource,
    },
    indexes::Indexes,
};

pub const DEFAULT_QUERY_CRS: &str = "EPSG:4326";
pub const DEFAULT_DRIVER: &str = "GTiff";

/// Where the input image comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceConfig {
    Local {
        path: PathBuf,
    },
    PlanetScene {
        scene: String,
        product_type: String,
        #[serde(default, skip_serializing)]
        api_key: Option<String>,
    },
}

impl SourceConfig {
    pub fn source(&self) -> Box<dyn DatasetSource> {
        match self {
            Self::Local { path } => Box::new(LocalImage::new(path)),
            Self::PlanetScene {
                scene,
                product_type,
                api_key,
            } => Box::new(PlanetScene {
                scene: scene.clone(),
                product_type: product_type.clone(),
                api_key: api_key.clone(),
            }),
        }
    }
}

/// How band rows are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ReadMode {
    /// One row of every band at a time, on the calling thread.
    #[default]
    Sequential,
    /// `(row, band)` reads of `batch_rows` rows at a time, on a pool of
    /// `threads` workers.
    Parallel { threads: usize, batch_rows: usize },
}

/// Part of the image to process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subset {
    /// Polygon as WKT, in `crs`.
    Region { wkt: String, crs: String },
    /// Explicit `x_UL,y_UL,x_BR,y_BR` pixel corners.
    Pixels(PixelCorners),
}

impl Subset {
    pub fn region(wkt: impl Into<String>) -> Self {
        Self::Region {
            wkt: wkt.into(),
            crs: DEFAULT_QUERY_CRS.to_string(),
        }
    }
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// What to compute from an opened image and where to put it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub algorithm: Algorithm,
    pub bands: Indexes,
    #[serde(default)]
    pub subset: Option<Subset>,
    #[serde(default)]
    pub worker_id: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub read_mode: ReadMode,
}

impl JobConfig {
    pub fn new(algorithm: Algorithm, bands: impl Into<Indexes>) -> Self {
        Self {
            algorithm,
            bands: bands.into(),
            subset: None,
            worker_id: 0,
            output_dir: default_output_dir(),
            driver: default_driver(),
            read_mode: ReadMode::default(),
        }
    }

    pub fn with_subset(mut self, subset: Subset) -> Self {
        self.subset = Some(subset);
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_worker_id(mut self, worker_id: u32) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }
}

/// Everything one run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub source: SourceConfig,
    #[serde(flatten)]
    pub job: JobConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn job_defaults() {
        let job = JobConfig::new(Algorithm::Mask, [1]);
        assert_eq!(job.driver, "GTiff");
        assert_eq!(job.read_mode, ReadMode::Sequential);
        assert_eq!(job.worker_id, 0);
        assert!(job.subset.is_none());
        assert_eq!(Subset::region("POLYGON EMPTY"), Subset::Region {
            wkt: "POLYGON EMPTY".to_string(),
            crs: "EPSG:4326".to_string()
        });
    }

    #[rstest]
    fn planet_scene_key_is_masked() {
        let config = RunConfig {
            source: SourceConfig::PlanetScene {
                scene: "scene".to_string(),
                product_type: "analytic".to_string(),
                api_key: Some("secret".to_string()),
            },
            job: JobConfig::new(Algorithm::NormalizedDifference, [4, 3]),
        };
        let source = config.source.source();
        assert_eq!(source.name(), "scene");
        assert!(!format!("{source:?}").contains("secret"));
    }
}
