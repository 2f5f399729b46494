use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    components::{
        collection::ImageCollection,
        cube::Cube,
        cubes::{
            ApplyPixelCube, DummyCube, FilterPixelCube, JoinBandsCube, ReduceCube,
            ReduceSpaceCube, ReduceTimeCube, SelectBandsCube, StreamCube, WindowTimeCube,
        },
        engines::RasterFacility,
        mask::ImageMask,
        reducers::ReducerKind,
        source::ImageCollectionCube,
        view::CubeView,
    },
    errors::{CubeError, Result},
};

/// Host-supplied callback turning a collection file path into a catalog.
pub type CollectionOpener = Box<dyn Fn(&Path) -> Result<Arc<dyn ImageCollection>> + Send + Sync>;

/// Builds operator graphs from declarative descriptions, the inverse of
/// [Cube::describe]. Descriptions are trees discriminated by `cube_type`.
pub struct CubeFactory {
    facility: Arc<dyn RasterFacility>,
    collection_opener: CollectionOpener,
}

fn field<T: DeserializeOwned>(description: &Value, key: &str) -> Result<T> {
    let value = description
        .get(key)
        .ok_or_else(|| CubeError::InvalidDescription(format!("missing `{key}`")))?;
    Ok(serde_json::from_value(value.clone())?)
}

fn optional_field<T: DeserializeOwned>(description: &Value, key: &str) -> Result<Option<T>> {
    match description.get(key) {
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        None => Ok(None),
    }
}

impl CubeFactory {
    pub fn new(facility: Arc<dyn RasterFacility>, collection_opener: CollectionOpener) -> Self {
        Self {
            facility,
            collection_opener,
        }
    }

    pub fn from_description(&self, description: &Value) -> Result<Arc<dyn Cube>> {
        let cube_type = description
            .get("cube_type")
            .and_then(Value::as_str)
            .ok_or_else(|| CubeError::InvalidDescription(String::from("missing `cube_type`")))?;
        match cube_type {
            "image_collection" => self.image_collection(description),
            "dummy" => {
                let cube = DummyCube::create(
                    field(description, "view")?,
                    field(description, "nbands")?,
                    field(description, "fill")?,
                    field(description, "chunk_size")?,
                )?;
                Ok(cube as Arc<dyn Cube>)
            }
            "reduce" => {
                let reducer: String = field(description, "reducer")?;
                let cube = ReduceCube::create(self.input(description)?, reducer.parse()?)?;
                Ok(cube as Arc<dyn Cube>)
            }
            "reduce_time" => {
                let cube = ReduceTimeCube::create(
                    self.input(description)?,
                    field(description, "reducer_bands")?,
                )?;
                Ok(cube as Arc<dyn Cube>)
            }
            "reduce_space" => {
                let cube = ReduceSpaceCube::create(
                    self.input(description)?,
                    field(description, "reducer_bands")?,
                )?;
                Ok(cube as Arc<dyn Cube>)
            }
            "window_time" => {
                let left = field(description, "win_size_l")?;
                let right = field(description, "win_size_r")?;
                let input = self.input(description)?;
                let cube = match optional_field::<Vec<f64>>(description, "kernel")? {
                    Some(kernel) => WindowTimeCube::create_kernel(input, kernel, left, right)?,
                    None => WindowTimeCube::create_reducers(
                        input,
                        field::<Vec<(ReducerKind, String)>>(description, "reducer_bands")?,
                        left,
                        right,
                    )?,
                };
                Ok(cube as Arc<dyn Cube>)
            }
            "select_bands" => {
                let cube =
                    SelectBandsCube::create(self.input(description)?, field(description, "bands")?)?;
                Ok(cube as Arc<dyn Cube>)
            }
            "apply_pixel" => {
                let cube = ApplyPixelCube::create(
                    self.input(description)?,
                    field(description, "expr")?,
                    optional_field(description, "band_names")?,
                )?;
                Ok(cube as Arc<dyn Cube>)
            }
            "filter_pixel" => {
                let cube = FilterPixelCube::create(
                    self.input(description)?,
                    field(description, "predicate")?,
                )?;
                Ok(cube as Arc<dyn Cube>)
            }
            "join_bands" => {
                let a = self.branch(description, "a")?;
                let b = self.branch(description, "b")?;
                let cube = JoinBandsCube::create(
                    a,
                    b,
                    field::<String>(description, "prefix_a")?,
                    field::<String>(description, "prefix_b")?,
                )?;
                Ok(cube as Arc<dyn Cube>)
            }
            "stream" => {
                let cube =
                    StreamCube::create(self.input(description)?, field::<String>(description, "command")?)?;
                Ok(cube as Arc<dyn Cube>)
            }
            other => Err(CubeError::UnknownCubeType(other.to_string())),
        }
    }

    fn input(&self, description: &Value) -> Result<Arc<dyn Cube>> {
        self.branch(description, "in_cube")
    }

    fn branch(&self, description: &Value, key: &str) -> Result<Arc<dyn Cube>> {
        let child = description
            .get(key)
            .ok_or_else(|| CubeError::InvalidDescription(format!("missing `{key}`")))?;
        self.from_description(child)
    }

    fn image_collection(&self, description: &Value) -> Result<Arc<dyn Cube>> {
        let file: PathBuf = field(description, "file")?;
        if !file.exists() {
            return Err(CubeError::CollectionNotFound(file));
        }
        let collection = (self.collection_opener)(&file)?;
        let view: CubeView = field(description, "view")?;
        let mut builder =
            ImageCollectionCube::builder(collection, self.facility.clone(), view);
        if let Some(chunk_size) = optional_field::<[usize; 3]>(description, "chunk_size")? {
            builder = builder.chunk_size(chunk_size);
        }
        if let Some(bands) = optional_field::<Vec<String>>(description, "bands")? {
            builder = builder.bands(bands);
        }
        if description.get("mask").is_some() {
            match (
                optional_field::<ImageMask>(description, "mask"),
                optional_field::<String>(description, "mask_band"),
            ) {
                (Ok(Some(mask)), Ok(Some(band))) => builder = builder.mask(band, mask),
                _ => warn!("invalid mask in image_collection description, mask is ignored"),
            }
        }
        if let Some(warp_args) = optional_field::<Vec<String>>(description, "warp_args")? {
            builder = builder.warp_args(warp_args);
        }
        let cube = builder.build()?;
        Ok(cube as Arc<dyn Cube>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{
            bands::{Band, BandCollection},
            collection::MemoryCollection,
        },
        testing::daily_stref,
    };
    use serde_json::json;

    struct NoFacility;

    impl RasterFacility for NoFacility {
        fn extract(
            &self,
            _descriptor: &str,
            _band_numbers: &[usize],
            _window: geo::Rect<f64>,
            _extra_args: &[String],
        ) -> Result<(Box<[f64]>, (usize, usize))> {
            unimplemented!("factory tests never read rasters")
        }

        fn warp(
            &self,
            _request: &crate::components::engines::WarpRequest,
        ) -> Result<Box<[f64]>> {
            unimplemented!("factory tests never read rasters")
        }
    }

    fn factory() -> CubeFactory {
        CubeFactory::new(
            Arc::new(NoFacility),
            Box::new(|path| {
                let mut bands = BandCollection::new();
                bands.add(Band::new("B04")).unwrap();
                bands.add(Band::new("SCL")).unwrap();
                Ok(Arc::new(MemoryCollection::new(bands).with_filename(path))
                    as Arc<dyn ImageCollection>)
            }),
        )
    }

    fn dummy_description() -> Value {
        json!({
            "cube_type": "dummy",
            "view": serde_json::to_value(CubeView::new(daily_stref(8, 8, 4))).unwrap(),
            "chunk_size": [2, 4, 4],
            "nbands": 1,
            "fill": 2.0,
        })
    }

    #[test]
    fn unknown_discriminator_is_fatal() {
        assert!(matches!(
            factory().from_description(&json!({"cube_type": "telescope"})),
            Err(CubeError::UnknownCubeType(_))
        ));
        assert!(matches!(
            factory().from_description(&json!({"reducer": "mean"})),
            Err(CubeError::InvalidDescription(_))
        ));
    }

    #[test]
    fn missing_collection_file_is_fatal() {
        let description = json!({
            "cube_type": "image_collection",
            "file": "/definitely/not/here.db",
            "view": serde_json::to_value(CubeView::new(daily_stref(8, 8, 4))).unwrap(),
        });
        assert!(matches!(
            factory().from_description(&description),
            Err(CubeError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn operator_graphs_round_trip() {
        let description = json!({
            "cube_type": "reduce_time",
            "reducer_bands": [["mean", "band1"], ["max", "band1"]],
            "in_cube": {
                "cube_type": "filter_pixel",
                "predicate": "band1 > 0.0",
                "in_cube": dummy_description(),
            },
        });
        let cube = factory().from_description(&description).unwrap();
        assert_eq!(cube.bands().names(), ["band1_mean", "band1_max"]);
        assert_eq!(cube.describe(), description);
        let rebuilt = factory().from_description(&cube.describe()).unwrap();
        assert_eq!(rebuilt.describe(), description);
        // the graph evaluates: constant 2.0 passes the filter
        let chunk = cube.read_chunk(0).unwrap();
        assert_eq!(chunk.at(0, 0, 0, 0), 2.0);
        assert_eq!(chunk.at(1, 0, 0, 0), 2.0);
    }

    #[test]
    fn reduce_space_builds_the_space_operator() {
        let description = json!({
            "cube_type": "reduce_space",
            "reducer_bands": [["mean", "band1"]],
            "in_cube": dummy_description(),
        });
        let cube = factory().from_description(&description).unwrap();
        assert_eq!(cube.st_ref().nx, 1);
        assert_eq!(cube.st_ref().ny, 1);
        assert_eq!(cube.st_ref().nt(), 4);
    }

    #[test]
    fn image_collection_parameters_are_restored() {
        let file = std::env::temp_dir().join("rastercube_factory_test.db");
        std::fs::write(&file, b"collection").unwrap();
        let description = json!({
            "cube_type": "image_collection",
            "file": file.display().to_string(),
            "view": serde_json::to_value(
                CubeView::new(daily_stref(8, 8, 4)).with_resampling("bilinear")
            ).unwrap(),
            "chunk_size": [1, 4, 4],
            "bands": ["B04"],
            "mask": {"mask_type": "value_mask", "values": [9.0], "invert": false},
            "mask_band": "SCL",
            "warp_args": ["NUM_THREADS=2"],
        });
        let cube = factory().from_description(&description).unwrap();
        assert_eq!(cube.chunk_size(), [1, 4, 4]);
        assert_eq!(cube.bands().names(), ["B04"]);
        assert_eq!(cube.describe(), description);
        std::fs::remove_file(&file).ok();
    }

    #[test]
    fn window_time_picks_kernel_or_reducers() {
        let with_kernel = json!({
            "cube_type": "window_time",
            "kernel": [1.0, 1.0, 1.0],
            "win_size_l": 1,
            "win_size_r": 1,
            "in_cube": dummy_description(),
        });
        let cube = factory().from_description(&with_kernel).unwrap();
        assert_eq!(cube.describe(), with_kernel);

        let with_reducers = json!({
            "cube_type": "window_time",
            "reducer_bands": [["min", "band1"]],
            "win_size_l": 2,
            "win_size_r": 0,
            "in_cube": dummy_description(),
        });
        let cube = factory().from_description(&with_reducers).unwrap();
        assert_eq!(cube.bands().names(), ["band1_min"]);
        assert_eq!(cube.describe(), with_reducers);
    }
}
