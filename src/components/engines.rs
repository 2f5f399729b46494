use geo::Rect;

use crate::errors::Result;

/// One aligned read from the raster facility: reproject, resample and
/// resize the selected bands of `descriptor` onto the target grid.
#[derive(Debug, Clone)]
pub struct WarpRequest<'a> {
    pub descriptor: &'a str,
    /// 1-based band numbers within the dataset.
    pub band_numbers: &'a [usize],
    /// Target bounding box, in the target projection.
    pub window: Rect<f64>,
    pub srs: &'a str,
    /// Target size `(ny, nx)`.
    pub size: (usize, usize),
    pub resampling: &'a str,
    pub extra_args: &'a [String],
}

/// External raster I/O: decoding, cropping, reprojection and resampling.
///
/// Both operations return band-planar `f64` data `[n_bands, ny, nx]` with
/// NaN as the nodata sentinel. Failures are fatal to the chunk being read.
pub trait RasterFacility: Send + Sync {
    /// Crop the selected bands to a bounding box given in the dataset's own
    /// projection, without resampling. Returns the planes and their
    /// `(ny, nx)` size.
    fn extract(
        &self,
        descriptor: &str,
        band_numbers: &[usize],
        window: Rect<f64>,
        extra_args: &[String],
    ) -> Result<(Box<[f64]>, (usize, usize))>;

    /// Produce planes aligned to the target grid of the request.
    fn warp(&self, request: &WarpRequest) -> Result<Box<[f64]>>;
}

/// Implementations for gdal
pub mod gdal_engine {
    use super::*;
    use gdal::{raster::ResampleAlg, spatial_ref::SpatialRef, Dataset, DatasetOptions, DriverManager};
    use geo::{AffineTransform, Coord};
    use log::{debug, warn};

    use crate::errors::CubeError;

    /// Raster facility backed by GDAL. Datasets are opened per call so
    /// concurrent chunk reads never share handles.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct GdalFacility;

    impl GdalFacility {
        pub fn new() -> Self {
            Self
        }
    }

    fn affine_from_gdal(gdal_transform: [f64; 6]) -> AffineTransform {
        AffineTransform::new(
            gdal_transform[1],
            gdal_transform[2],
            gdal_transform[0],
            gdal_transform[4],
            gdal_transform[5],
            gdal_transform[3],
        )
    }

    fn facility_error(descriptor: &str, message: impl ToString) -> CubeError {
        CubeError::RasterFacility {
            descriptor: descriptor.to_string(),
            message: message.to_string(),
        }
    }

    /// Extra args are forwarded as GDAL `KEY=VALUE` open options.
    fn open(descriptor: &str, extra_args: &[String]) -> Result<Dataset> {
        let options: Vec<&str> = extra_args.iter().map(String::as_str).collect();
        let result = if options.is_empty() {
            Dataset::open(descriptor)
        } else {
            Dataset::open_ex(
                descriptor,
                DatasetOptions {
                    open_options: Some(&options),
                    ..DatasetOptions::default()
                },
            )
        };
        result.map_err(|e| facility_error(descriptor, e))
    }

    fn resample_from_str(name: &str) -> ResampleAlg {
        match name {
            "near" | "nearest" => ResampleAlg::NearestNeighbour,
            "bilinear" => ResampleAlg::Bilinear,
            "cubic" => ResampleAlg::Cubic,
            "cubicspline" => ResampleAlg::CubicSpline,
            "lanczos" => ResampleAlg::Lanczos,
            "average" => ResampleAlg::Average,
            "mode" => ResampleAlg::Mode,
            other => {
                warn!("unknown resampling method `{other}`, falling back to nearest");
                ResampleAlg::NearestNeighbour
            }
        }
    }

    /// Source pixel window `(px0, py0, px1, py1)` covering a projected box.
    fn pixel_window(
        dataset: &Dataset,
        descriptor: &str,
        window: &Rect<f64>,
    ) -> Result<(f64, f64, f64, f64)> {
        let affine = affine_from_gdal(dataset.geo_transform()?);
        let inverse = affine
            .inverse()
            .ok_or_else(|| facility_error(descriptor, "degenerate geotransform"))?;
        let ul = inverse.apply(Coord {
            x: window.min().x,
            y: window.max().y,
        });
        let lr = inverse.apply(Coord {
            x: window.max().x,
            y: window.min().y,
        });
        Ok((
            ul.x.min(lr.x),
            ul.y.min(lr.y),
            ul.x.max(lr.x),
            ul.y.max(lr.y),
        ))
    }

    fn masked_nodata(value: f64, no_data: Option<f64>) -> f64 {
        match no_data {
            Some(nd) if (value - nd).abs() < f64::EPSILON || (value.is_nan() && nd.is_nan()) => {
                f64::NAN
            }
            _ => value,
        }
    }

    /// Resampled read of a source pixel window into NaN-initialized target
    /// planes. Parts of the window outside the source extent stay NaN.
    fn read_into_planes(
        dataset: &Dataset,
        descriptor: &str,
        band_numbers: &[usize],
        (px0, py0, px1, py1): (f64, f64, f64, f64),
        (ny_out, nx_out): (usize, usize),
        resample: ResampleAlg,
    ) -> Result<Box<[f64]>> {
        let mut planes = vec![f64::NAN; band_numbers.len() * ny_out * nx_out];
        let (xsize, ysize) = dataset.raster_size();
        let cx0 = px0.max(0.0);
        let cx1 = px1.min(xsize as f64);
        let cy0 = py0.max(0.0);
        let cy1 = py1.min(ysize as f64);
        if cx1 <= cx0 || cy1 <= cy0 {
            debug!("window of `{descriptor}` lies outside the dataset");
            return Ok(planes.into_boxed_slice());
        }

        // covered sub-rectangle of the target
        let jx0 = ((cx0 - px0) / (px1 - px0) * nx_out as f64).floor() as usize;
        let jx1 = (((cx1 - px0) / (px1 - px0) * nx_out as f64).ceil() as usize).min(nx_out);
        let jy0 = ((cy0 - py0) / (py1 - py0) * ny_out as f64).floor() as usize;
        let jy1 = (((cy1 - py0) / (py1 - py0) * ny_out as f64).ceil() as usize).min(ny_out);
        let (out_w, out_h) = (jx1 - jx0, jy1 - jy0);
        if out_w == 0 || out_h == 0 {
            return Ok(planes.into_boxed_slice());
        }

        let src_x = cx0.floor() as usize;
        let src_y = cy0.floor() as usize;
        let src_w = ((cx1.ceil() as usize).min(xsize)) - src_x;
        let src_h = ((cy1.ceil() as usize).min(ysize)) - src_y;

        for (plane_idx, band_number) in band_numbers.iter().enumerate() {
            let band = dataset
                .rasterband(*band_number)
                .map_err(|e| facility_error(descriptor, e))?;
            let no_data = band.no_data_value();
            let buffer = band
                .read_as::<f64>(
                    (src_x as isize, src_y as isize),
                    (src_w, src_h),
                    (out_w, out_h),
                    Some(resample),
                )
                .map_err(|e| facility_error(descriptor, e))?;
            let plane = &mut planes[plane_idx * ny_out * nx_out..(plane_idx + 1) * ny_out * nx_out];
            for row in 0..out_h {
                let source_row = &buffer.data()[row * out_w..(row + 1) * out_w];
                let target_row = &mut plane[(jy0 + row) * nx_out + jx0..][..out_w];
                for (target, source) in target_row.iter_mut().zip(source_row) {
                    *target = masked_nodata(*source, no_data);
                }
            }
        }
        Ok(planes.into_boxed_slice())
    }

    /// Reprojection path: render all source bands onto the target grid via
    /// an in-memory dataset, then read the selected planes.
    ///
    /// GDALReprojectImage resamples with nearest neighbour; the requested
    /// method only applies on the same-projection path.
    fn reproject_to_grid(
        source: &Dataset,
        request: &WarpRequest<'_>,
        target_srs: &SpatialRef,
    ) -> Result<Box<[f64]>> {
        let (ny, nx) = request.size;
        let descriptor = request.descriptor;
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut target = driver
            .create_with_band_type::<f64, _>("", nx, ny, source.raster_count())
            .map_err(|e| facility_error(descriptor, e))?;
        target.set_spatial_ref(target_srs)?;
        let dx = request.window.width() / nx as f64;
        let dy = request.window.height() / ny as f64;
        target.set_geo_transform(&[
            request.window.min().x,
            dx,
            0.0,
            request.window.max().y,
            0.0,
            -dy,
        ])?;
        for band_number in 1..=target.raster_count() {
            let mut band = target.rasterband(band_number)?;
            band.set_no_data_value(Some(f64::NAN))?;
            band.fill(f64::NAN, None)?;
        }
        gdal::raster::reproject(source, &target).map_err(|e| facility_error(descriptor, e))?;

        let mut planes = vec![f64::NAN; request.band_numbers.len() * ny * nx];
        for (plane_idx, band_number) in request.band_numbers.iter().enumerate() {
            let buffer = target
                .rasterband(*band_number)
                .and_then(|band| band.read_as::<f64>((0, 0), (nx, ny), (nx, ny), None))
                .map_err(|e| facility_error(descriptor, e))?;
            planes[plane_idx * ny * nx..(plane_idx + 1) * ny * nx].copy_from_slice(buffer.data());
        }
        Ok(planes.into_boxed_slice())
    }

    impl RasterFacility for GdalFacility {
        fn extract(
            &self,
            descriptor: &str,
            band_numbers: &[usize],
            window: Rect<f64>,
            extra_args: &[String],
        ) -> Result<(Box<[f64]>, (usize, usize))> {
            let dataset = open(descriptor, extra_args)?;
            let (px0, py0, px1, py1) = pixel_window(&dataset, descriptor, &window)?;
            let (xsize, ysize) = dataset.raster_size();
            let x0 = px0.max(0.0).floor() as usize;
            let y0 = py0.max(0.0).floor() as usize;
            let x1 = (px1.min(xsize as f64).ceil() as usize).max(x0);
            let y1 = (py1.min(ysize as f64).ceil() as usize).max(y0);
            let size = (y1 - y0, x1 - x0);
            let planes = read_into_planes(
                &dataset,
                descriptor,
                band_numbers,
                (x0 as f64, y0 as f64, x1 as f64, y1 as f64),
                size,
                ResampleAlg::NearestNeighbour,
            )?;
            Ok((planes, size))
        }

        fn warp(&self, request: &WarpRequest) -> Result<Box<[f64]>> {
            let descriptor = request.descriptor;
            debug!("warping `{descriptor}` onto {:?} pixels", request.size);
            let dataset = open(descriptor, request.extra_args)?;
            let target_srs = SpatialRef::from_definition(request.srs)
                .map_err(|e| facility_error(descriptor, e))?;
            let source_srs = dataset
                .spatial_ref()
                .map_err(|e| facility_error(descriptor, e))?;
            if source_srs.to_wkt()? == target_srs.to_wkt()? {
                let window = pixel_window(&dataset, descriptor, &request.window)?;
                read_into_planes(
                    &dataset,
                    descriptor,
                    request.band_numbers,
                    window,
                    request.size,
                    resample_from_str(request.resampling),
                )
            } else {
                reproject_to_grid(&dataset, request, &target_srs)
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn gdal_affine_order() {
            // geotransform [xoff, a, b, yoff, d, e]
            let affine = affine_from_gdal([300000.0, 10.0, 0.0, 5000000.0, 0.0, -10.0]);
            let world = affine.apply(Coord { x: 2.0, y: 3.0 });
            assert_eq!(world, Coord { x: 300020.0, y: 4999970.0 });
            let back = affine.inverse().unwrap().apply(world);
            assert_eq!(back, Coord { x: 2.0, y: 3.0 });
        }

        #[test]
        fn nodata_becomes_nan() {
            assert!(masked_nodata(-9999.0, Some(-9999.0)).is_nan());
            assert_eq!(masked_nodata(5.0, Some(-9999.0)), 5.0);
            assert_eq!(masked_nodata(5.0, None), 5.0);
        }
    }
}
