use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::{arr1, arr2};
use serde_json::json;

use ncsource::backend::{Preprocess, SOURCE_ENCODING_SINCE};
use ncsource::dataset::combine::combine_nested;
use ncsource::fs::FileSystem;
use ncsource::options::StorageOptions;
use ncsource::prelude::*;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Open {
        path: PathBuf,
        chunks: Option<Chunks>,
        options: OpenOptions,
    },
    OpenMany {
        paths: Vec<PathBuf>,
        chunks: Option<Chunks>,
        options: OpenOptions,
        preprocess: bool,
    },
}

/// Records the calls made to it and returns small in-memory datasets.
#[derive(Clone)]
struct Recorder {
    version: Version,
    calls: Arc<Mutex<Vec<Call>>>,
    fragments: Arc<Mutex<Vec<Dataset>>>,
}

impl Recorder {
    fn new(version: Version) -> Recorder {
        Recorder {
            version,
            calls: Arc::default(),
            fragments: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

fn fragment(path: &Path) -> Dataset {
    let mut ds = Dataset::new();
    ds.add_data_var(
        "air",
        Variable::from_values(["time", "x"], Values::Float(arr2(&[[1., 2.]]).into_dyn()))
            .unwrap()
            .with_source(path),
    )
    .unwrap();
    ds.add_coord(
        "time",
        Variable::from_values(["time"], Values::Float(arr1(&[0.]).into_dyn())).unwrap(),
    )
    .unwrap();
    ds
}

impl ArrayBackend for Recorder {
    fn version(&self) -> Version {
        self.version
    }

    fn open_dataset(
        &self,
        path: &Path,
        chunks: Option<&Chunks>,
        options: &OpenOptions,
    ) -> anyhow::Result<Dataset> {
        self.calls.lock().unwrap().push(Call::Open {
            path: path.to_path_buf(),
            chunks: chunks.cloned(),
            options: options.clone(),
        });

        Ok(fragment(path))
    }

    fn open_mfdataset(
        &self,
        paths: &[PathBuf],
        chunks: Option<&Chunks>,
        options: &OpenOptions,
        preprocess: Option<&Preprocess>,
    ) -> anyhow::Result<Dataset> {
        self.calls.lock().unwrap().push(Call::OpenMany {
            paths: paths.to_vec(),
            chunks: chunks.cloned(),
            options: options.clone(),
            preprocess: preprocess.is_some(),
        });

        let fragments = paths
            .iter()
            .map(|p| match preprocess {
                Some(f) => f(fragment(p)),
                None => Ok(fragment(p)),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.fragments.lock().unwrap().extend(fragments.iter().cloned());

        let dim = options
            .get("concat_dim")
            .and_then(|d| d.as_str())
            .unwrap_or("concat_dim");
        combine_nested(fragments, dim)
    }
}

/// Resolves globs to a fixed list of files and counts the calls.
#[derive(Clone, Default)]
struct Listing {
    files: Vec<PathBuf>,
    specs: Arc<Mutex<Vec<PathSpec>>>,
    count: Arc<AtomicUsize>,
}

impl Listing {
    fn new(files: &[&str]) -> Listing {
        Listing {
            files: files.iter().map(PathBuf::from).collect(),
            ..Listing::default()
        }
    }
}

impl FileSystem for Listing {
    fn open_local(
        &self,
        spec: &PathSpec,
        _storage_options: &StorageOptions,
    ) -> anyhow::Result<Vec<PathBuf>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());

        match spec {
            PathSpec::Single(s) if s.contains('*') => Ok(self.files.clone()),
            _ => Ok(spec.as_slice().iter().map(PathBuf::from).collect()),
        }
    }
}

fn source<P: Into<PathSpec>>(urlpath: P, files: &[&str]) -> (NetCDFSource, Recorder, Listing) {
    let backend = Recorder::new(Version::CURRENT);
    let fs = Listing::new(files);
    let src = NetCDFSource::new(urlpath)
        .with_backend(backend.clone())
        .with_filesystem(fs.clone());

    (src, backend, fs)
}

fn options(o: serde_json::Value) -> OpenOptions {
    serde_json::from_value(o).unwrap()
}

#[test]
fn single_file_plain_open() {
    let (mut src, backend, _) = source("data/air.nc", &[]);
    let src2 = NetCDFSource::new("data/air.nc");
    assert_eq!(src2.pattern().unwrap(), None);

    src.to_dask().unwrap();

    assert_eq!(
        backend.calls(),
        vec![Call::Open {
            path: "data/air.nc".into(),
            chunks: None,
            options: OpenOptions::new(),
        }]
    );
}

#[test]
fn single_file_forwards_chunks_and_options() {
    let (src, backend, _) = source("data/air.nc", &[]);
    let mut src = src
        .with_chunks(Chunks::Uniform(5))
        .with_xarray_kwargs(options(json!({"engine": "h5netcdf"})));

    src.to_dask().unwrap();

    assert_eq!(
        backend.calls(),
        vec![Call::Open {
            path: "data/air.nc".into(),
            chunks: Some(Chunks::Uniform(5)),
            options: options(json!({"engine": "h5netcdf"})),
        }]
    );
}

#[test]
fn glob_merges_along_default_dim() {
    let (mut src, backend, _) = source("data/*.nc", &["data/a.nc", "data/b.nc"]);

    let ds = src.to_dask().unwrap();
    assert_eq!(ds.dims()["concat_dim"], 2);

    assert_eq!(
        backend.calls(),
        vec![Call::OpenMany {
            paths: vec!["data/a.nc".into(), "data/b.nc".into()],
            chunks: None,
            options: options(json!({"concat_dim": "concat_dim", "combine": "nested"})),
            preprocess: false,
        }]
    );
}

#[test]
fn list_merges_along_default_dim() {
    let (mut src, backend, _) = source(["a.nc", "b.nc"], &[]);
    src.to_dask().unwrap();

    match &backend.calls()[..] {
        [Call::OpenMany {
            paths, options: o, ..
        }] => {
            assert_eq!(paths, &[PathBuf::from("a.nc"), PathBuf::from("b.nc")]);
            assert_eq!(o, &options(json!({"concat_dim": "concat_dim", "combine": "nested"})));
        }
        calls => panic!("unexpected calls: {calls:?}"),
    }
}

#[test]
fn caller_concat_dim_wins() {
    let (src, backend, _) = source("data/*.nc", &["data/a.nc", "data/b.nc"]);
    let mut src = src.with_xarray_kwargs(options(json!({"concat_dim": "time"})));

    let ds = src.to_dask().unwrap();
    assert_eq!(ds.dims()["time"], 2);
    assert!(!ds.dims().contains_key("concat_dim"));

    match &backend.calls()[..] {
        [Call::OpenMany { options: o, .. }] => {
            assert_eq!(o, &options(json!({"concat_dim": "time", "combine": "nested"})));
        }
        calls => panic!("unexpected calls: {calls:?}"),
    }
}

#[test]
fn caller_combine_wins() {
    let (src, backend, _) = source(["a.nc", "b.nc"], &[]);
    let mut src = src.with_xarray_kwargs(options(json!({"combine": "by_coords"})));
    src.to_dask().unwrap();

    match &backend.calls()[..] {
        [Call::OpenMany { options: o, .. }] => {
            assert_eq!(o.get("combine"), Some(&json!("by_coords")));
            assert_eq!(o.get("concat_dim"), Some(&json!("concat_dim")));
        }
        calls => panic!("unexpected calls: {calls:?}"),
    }
}

#[test]
fn pattern_fields_become_coordinates() {
    let (mut src, backend, fs) = source(
        "data/air_{year}.nc",
        &["/home/me/data/air_1999.nc", "/home/me/data/air_2000.nc"],
    );
    assert_eq!(src.urlpath().unwrap(), PathSpec::from("data/air_*.nc"));

    let ds = src.to_dask().unwrap();

    // every fragment gets its own year before merging
    let years = backend
        .fragments
        .lock()
        .unwrap()
        .iter()
        .map(|f| f.coords()["year"].values().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        years,
        vec![
            Values::Str(ndarray::arr0("1999".to_string()).into_dyn()),
            Values::Str(ndarray::arr0("2000".to_string()).into_dyn()),
        ]
    );

    let year = &ds.coords()["year"];
    assert_eq!(year.dims(), &["concat_dim"]);
    assert_eq!(
        year.values().unwrap(),
        Values::Str(arr1(&["1999".to_string(), "2000".to_string()]).into_dyn())
    );

    assert_eq!(*fs.specs.lock().unwrap(), vec![PathSpec::from("data/air_*.nc")]);
    assert!(matches!(
        &backend.calls()[..],
        [Call::OpenMany {
            preprocess: true,
            ..
        }]
    ));
}

#[test]
fn explicit_pattern_for_list() {
    let (src, backend, _) = source(["/d/run_1.nc", "/d/run_2.nc"], &[]);
    let mut src = src
        .with_path_as_pattern(PathAsPattern::Pattern("run_{member:d}.nc".into()))
        .with_concat_dim("member");

    let ds = src.to_dask().unwrap();
    assert_eq!(
        ds.coords()["member"].values().unwrap(),
        Values::Int(arr1(&[1i64, 2]).into_dyn())
    );
    assert_eq!(backend.fragments.lock().unwrap().len(), 2);
}

#[test]
fn pattern_mismatch_fails() {
    let (src, _, _) = source("data/air_{year}.nc", &["/data/sst_1999.nc"]);
    let mut src = src;

    let e = src.to_dask().unwrap_err();
    assert!(matches!(
        e.downcast_ref::<SourceError>(),
        Some(SourceError::PatternMismatch { .. })
    ));
}

#[test]
fn old_backend_refuses_patterns() {
    let backend = Recorder::new(ncsource::backend::Version::new(0, 11, 1));
    let fs = Listing::new(&["data/air_1999.nc"]);
    let mut src = NetCDFSource::new("data/air_{year}.nc")
        .with_backend(backend.clone())
        .with_filesystem(fs.clone());

    let e = src.to_dask().unwrap_err();
    match e.downcast_ref::<SourceError>() {
        Some(SourceError::SourcePathUnsupported { found, required }) => {
            assert_eq!(found.to_string(), "0.11.1");
            assert_eq!(*required, SOURCE_ENCODING_SINCE);
        }
        _ => panic!("unexpected error: {e}"),
    }

    assert!(backend.calls().is_empty());
    assert_eq!(fs.count.load(Ordering::SeqCst), 0);
}

#[test]
fn old_backend_without_pattern() {
    let backend = Recorder::new(ncsource::backend::Version::new(0, 10, 0));
    let mut src = NetCDFSource::new(["a.nc", "b.nc"])
        .with_backend(backend.clone())
        .with_filesystem(Listing::default());

    src.to_dask().unwrap();
    assert_eq!(backend.calls().len(), 1);
}

#[test]
fn empty_pattern_reads_no_coordinates() {
    let backend = Recorder::new(ncsource::backend::Version::new(0, 10, 0));
    let fs = Listing::default();
    let mut src = NetCDFSource::new(["air_1999.nc", "air_2000.nc"])
        .with_path_as_pattern(PathAsPattern::Pattern(String::new()))
        .with_backend(backend.clone())
        .with_filesystem(fs.clone());

    assert_eq!(src.pattern().unwrap(), None);

    let ds = src.to_dask().unwrap();
    assert!(!ds.coords().contains_key("year"));

    match &backend.calls()[..] {
        [Call::OpenMany {
            paths, preprocess, ..
        }] => {
            assert_eq!(paths, &[PathBuf::from("air_1999.nc"), PathBuf::from("air_2000.nc")]);
            assert!(!preprocess);
        }
        calls => panic!("unexpected calls: {calls:?}"),
    }
    assert_eq!(
        fs.specs.lock().unwrap().as_slice(),
        &[PathSpec::from(["air_1999.nc", "air_2000.nc"])]
    );
}

#[test]
fn opened_once() {
    let (mut src, backend, fs) = source("data/*.nc", &["data/a.nc", "data/b.nc"]);

    let a: *const Dataset = src.to_dask().unwrap();
    let b: *const Dataset = src.to_dask().unwrap();
    assert!(std::ptr::eq(a, b));

    src.discover().unwrap();
    src.read().unwrap();

    assert_eq!(backend.calls().len(), 1);
    assert_eq!(fs.count.load(Ordering::SeqCst), 1);
}

#[test]
fn errors_are_not_cached() {
    #[derive(Clone, Default)]
    struct Failing(Arc<AtomicUsize>);

    impl FileSystem for Failing {
        fn open_local(&self, _: &PathSpec, _: &StorageOptions) -> anyhow::Result<Vec<PathBuf>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("disk on fire"))
        }
    }

    let fs = Failing::default();
    let mut src = NetCDFSource::new("data/air.nc")
        .with_backend(Recorder::new(Version::CURRENT))
        .with_filesystem(fs.clone());

    assert_eq!(src.to_dask().unwrap_err().to_string(), "disk on fire");
    assert!(src.to_dask().is_err());
    assert_eq!(fs.0.load(Ordering::SeqCst), 2);
}

#[test]
fn discover_schema() {
    let (src, _, _) = source("data/air.nc", &[]);
    let mut src = src.with_metadata([("title".to_string(), json!("mine"))].into());

    let schema = src.discover().unwrap();
    assert_eq!(schema.dims["time"], 1);
    assert_eq!(schema.data_vars["air"], vec!["time"]);
    assert_eq!(schema.coords, vec!["time"]);

    assert_eq!(src.metadata()["title"], json!("mine"));
    assert_eq!(src.name(), "netcdf");
    assert!(src.version() >= SOURCE_ENCODING_SINCE);

    let v = src.read_partition("air", &[0, 0]).unwrap();
    assert_eq!(v, Values::Float(arr2(&[[1., 2.]]).into_dyn()));
    assert!(src.read_partition("nope", &[0]).is_err());

    src.close();
}
