use std::path::Path;

use hdf5::types::VarLenUnicode;
use ndarray::{arr1, Array2};
use serde_json::json;

use ncsource::dataset::AttrValue;
use ncsource::prelude::*;

fn write_sst(path: &Path, member: i32) {
    let hf = hdf5::File::create(path).unwrap();

    let lat = hf
        .new_dataset_builder()
        .with_data(&arr1(&[60., 61., 62.]))
        .create("lat")
        .unwrap();
    lat.new_attr::<VarLenUnicode>()
        .create("CLASS")
        .unwrap()
        .write_scalar(&"DIMENSION_SCALE".parse::<VarLenUnicode>().unwrap())
        .unwrap();

    let sst = Array2::from_shape_fn((3, 4), |(i, j)| (member * 100 + i as i32 * 4 + j as i32) as f32);
    let ds = hf
        .new_dataset_builder()
        .with_data(&sst)
        .create("SST")
        .unwrap();
    ds.new_attr::<VarLenUnicode>()
        .create("units")
        .unwrap()
        .write_scalar(&"degC".parse::<VarLenUnicode>().unwrap())
        .unwrap();

    hf.new_attr::<i64>()
        .create("member")
        .unwrap()
        .write_scalar(&(member as i64))
        .unwrap();
}

fn h5netcdf() -> OpenOptions {
    [("engine", json!("h5netcdf"))].into_iter().collect()
}

#[test]
fn single_file() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("sst.h5");
    write_sst(&p, 0);

    let mut src = NetCDFSource::new(p.to_str().unwrap()).with_xarray_kwargs(h5netcdf());
    let ds = src.to_dask().unwrap();

    assert_eq!(ds.dims()["lat"], 3);
    assert_eq!(ds.dims()["phony_dim_4"], 4);
    assert_eq!(ds.attrs()["member"], AttrValue::Int(0));

    let sst = &ds.data_vars()["SST"];
    assert_eq!(sst.dims(), &["lat", "phony_dim_4"]);
    assert_eq!(sst.attrs()["units"], AttrValue::from("degC"));
    assert_eq!(sst.encoding().engine.as_deref(), Some("h5netcdf"));

    let v = sst.read(&[2..3, 1..3]).unwrap();
    assert_eq!(v.to_f64().unwrap().into_raw_vec_and_offset().0, vec![9., 10.]);
}

#[test]
fn ensemble_members() {
    let dir = tempfile::tempdir().unwrap();
    for m in [2, 1, 3] {
        write_sst(&dir.path().join(format!("sst_m{m}.h5")), m);
    }

    let pattern = format!("{}/sst_m{{member:d}}.h5", dir.path().display());
    let mut src = NetCDFSource::new(pattern)
        .with_concat_dim("member")
        .with_chunks(Chunks::Uniform(2))
        .with_xarray_kwargs(h5netcdf());

    let ds = src.to_dask().unwrap();
    assert_eq!(
        ds.coords()["member"].values().unwrap(),
        Values::Int(arr1(&[1i64, 2, 3]).into_dyn())
    );

    let sst = &ds.data_vars()["SST"];
    assert_eq!(sst.shape(), &[3, 3, 4]);
    assert_eq!(
        sst.chunks().unwrap(),
        &[vec![1, 1, 1], vec![2, 1], vec![2, 2]]
    );

    let v = sst.read_chunk(&[2, 0, 1]).unwrap();
    assert_eq!(
        v.to_f64().unwrap().into_raw_vec_and_offset().0,
        vec![302., 303., 306., 307.]
    );
}
