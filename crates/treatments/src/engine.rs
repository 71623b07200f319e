//! Entry points into the engine's raster/vector utilities.
//!
//! Each utility takes its configuration as a parsed command-line style
//! option list, wrapped in an RAII options struct. These functions are the
//! only place where algorithm work is actually delegated; everything above
//! them merely assembles option vectors.

use std::ffi::{c_int, CString};
use std::path::Path;

use gdal::Dataset;

use crate::gdalinterop;
use crate::{Error, Result};

macro_rules! app_options {
    ($name:ident, $sys:ident, $new:ident, $free:ident) => {
        struct $name {
            options: *mut gdal_sys::$sys,
        }

        impl $name {
            fn new(opts: &[String]) -> Result<Self> {
                let c_opts = gdalinterop::create_string_list(opts)?;
                let options = unsafe { gdal_sys::$new(c_opts.as_ptr(), std::ptr::null_mut()) };
                if options.is_null() {
                    return Err(Error::InvalidInput(format!(
                        "Failed to parse {} options: {opts:?}",
                        stringify!($name)
                    )));
                }

                Ok(Self { options })
            }

            fn c_options(&self) -> *mut gdal_sys::$sys {
                self.options
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { gdal_sys::$free(self.c_options()) };
            }
        }
    };
}

app_options!(TranslateAppOptions, GDALTranslateOptions, GDALTranslateOptionsNew, GDALTranslateOptionsFree);
app_options!(WarpAppOptions, GDALWarpAppOptions, GDALWarpAppOptionsNew, GDALWarpAppOptionsFree);
app_options!(RasterizeAppOptions, GDALRasterizeOptions, GDALRasterizeOptionsNew, GDALRasterizeOptionsFree);
app_options!(
    VectorTranslateAppOptions,
    GDALVectorTranslateOptions,
    GDALVectorTranslateOptionsNew,
    GDALVectorTranslateOptionsFree
);
app_options!(BuildVrtAppOptions, GDALBuildVRTOptions, GDALBuildVRTOptionsNew, GDALBuildVRTOptionsFree);

fn dest_path_cstring(dest: &Path) -> Result<CString> {
    gdalinterop::create_output_directory_if_needed(dest)?;
    Ok(CString::new(dest.to_string_lossy().as_ref())?)
}

/// `gdal_translate` equivalent, options match the command line tool
pub fn translate_to_disk(src: &Dataset, dest: &Path, options: &[String]) -> Result<Dataset> {
    let opts = TranslateAppOptions::new(options)?;
    let path_str = dest_path_cstring(dest)?;

    let mut usage_error: c_int = gdalinterop::FALSE;
    let handle = unsafe {
        gdal_sys::GDALTranslate(
            path_str.as_ptr(),
            src.c_dataset(),
            opts.c_options(),
            &mut usage_error,
        )
    };

    if usage_error == gdalinterop::TRUE {
        return Err(Error::InvalidInput("Translate: invalid arguments".to_string()));
    }

    Ok(unsafe { Dataset::from_c_dataset(gdalinterop::check_pointer(handle, "GDALTranslate")?) })
}

/// `gdalwarp` equivalent over one or more source datasets
pub fn warp_to_disk(srcs: &[&Dataset], dest: &Path, options: &[String]) -> Result<Dataset> {
    let opts = WarpAppOptions::new(options)?;
    let path_str = dest_path_cstring(dest)?;

    let mut usage_error: c_int = gdalinterop::FALSE;
    let handle = unsafe {
        let mut src_handles: Vec<gdal_sys::GDALDatasetH> = srcs.iter().map(|ds| ds.c_dataset()).collect();
        gdal_sys::GDALWarp(
            path_str.as_ptr(),
            std::ptr::null_mut(),
            src_handles.len() as c_int,
            src_handles.as_mut_ptr(),
            opts.c_options(),
            &mut usage_error,
        )
    };

    if usage_error == gdalinterop::TRUE {
        return Err(Error::InvalidInput("Warp: invalid arguments".to_string()));
    }

    Ok(unsafe { Dataset::from_c_dataset(gdalinterop::check_pointer(handle, "GDALWarp")?) })
}

/// `gdal_rasterize` equivalent, burning the vector source into a new raster
pub fn rasterize_to_disk(src: &Dataset, dest: &Path, options: &[String]) -> Result<Dataset> {
    let opts = RasterizeAppOptions::new(options)?;
    let path_str = dest_path_cstring(dest)?;

    let mut usage_error: c_int = gdalinterop::FALSE;
    let handle = unsafe {
        gdal_sys::GDALRasterize(
            path_str.as_ptr(),
            std::ptr::null_mut(),
            src.c_dataset(),
            opts.c_options(),
            &mut usage_error,
        )
    };

    if usage_error == gdalinterop::TRUE {
        return Err(Error::InvalidInput("Rasterize: invalid arguments".to_string()));
    }

    Ok(unsafe { Dataset::from_c_dataset(gdalinterop::check_pointer(handle, "GDALRasterize")?) })
}

/// `ogr2ogr` equivalent writing to a new or existing dataset at `dest`
pub fn vector_translate_to_disk(src: &Dataset, dest: &Path, options: &[String]) -> Result<Dataset> {
    let opts = VectorTranslateAppOptions::new(options)?;
    let path_str = dest_path_cstring(dest)?;

    let mut usage_error: c_int = gdalinterop::FALSE;
    let handle = unsafe {
        let mut src_handle = src.c_dataset();
        gdal_sys::GDALVectorTranslate(
            path_str.as_ptr(),
            std::ptr::null_mut(),
            1,
            &mut src_handle,
            opts.c_options(),
            &mut usage_error,
        )
    };

    if usage_error == gdalinterop::TRUE {
        return Err(Error::InvalidInput("Vector translate: invalid arguments".to_string()));
    }

    Ok(unsafe { Dataset::from_c_dataset(gdalinterop::check_pointer(handle, "GDALVectorTranslate")?) })
}

/// `gdalbuildvrt` equivalent, typically targeting a `/vsimem/` path
pub fn build_vrt(srcs: &[&Dataset], dest: &Path, options: &[String]) -> Result<Dataset> {
    let opts = BuildVrtAppOptions::new(options)?;
    let path_str = CString::new(dest.to_string_lossy().as_ref())?;

    let mut usage_error: c_int = gdalinterop::FALSE;
    let handle = unsafe {
        let mut src_handles: Vec<gdal_sys::GDALDatasetH> = srcs.iter().map(|ds| ds.c_dataset()).collect();
        gdal_sys::GDALBuildVRT(
            path_str.as_ptr(),
            src_handles.len() as c_int,
            src_handles.as_mut_ptr(),
            std::ptr::null_mut(),
            opts.c_options(),
            &mut usage_error,
        )
    };

    if usage_error == gdalinterop::TRUE {
        return Err(Error::InvalidInput("Build VRT: invalid arguments".to_string()));
    }

    Ok(unsafe { Dataset::from_c_dataset(gdalinterop::check_pointer(handle, "GDALBuildVRT")?) })
}
