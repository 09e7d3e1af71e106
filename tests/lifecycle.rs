use anyhow::bail;
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use magpie::config::kinds::AssetKindBuilder;
use magpie::database::open_database;
use magpie::models::job::QueueKind;
use magpie::queue::memory::{MemoryQueue, QueueCall};
use magpie::queue::redb::RedbQueue;
use magpie::repository::AssetRepository;
use magpie::repository::memory::MemoryRepository;
use magpie::repository::redb::RedbRepository;
use magpie::storage::fs::FsObjectStore;
use magpie::storage::memory::{MemoryObjectStore, StoreCall};
use magpie::storage::staging::Staging;
use magpie::workflow::processors::image::encode_image;
use magpie::{
    Asset, AssetError, AssetFormat, AssetId, AssetInput, AssetKindConfig, AssetState, KindRegistry,
    Lifecycle, Processor, Transition, VersionSpec, WorkOutcome, Worker,
};

struct Harness {
    lifecycle: Lifecycle,
    store: Arc<MemoryObjectStore>,
    queue: Arc<MemoryQueue>,
    repository: Arc<MemoryRepository>,
    staging: TempDir,
}

impl Harness {
    fn new(configure: impl FnOnce(AssetKindBuilder) -> AssetKindBuilder) -> Self {
        let staging = tempfile::tempdir().unwrap();
        let config = configure(AssetKindConfig::builder("photo").staging_dir(staging.path()))
            .build()
            .unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let repository = Arc::new(MemoryRepository::new());
        let lifecycle = Lifecycle::new(
            KindRegistry::new().with(config).unwrap(),
            store.clone(),
            queue.clone(),
            repository.clone(),
            "web-1",
        );
        Self {
            lifecycle,
            store,
            queue,
            repository,
            staging,
        }
    }

    fn stored(&self, asset: &Asset) -> Asset {
        self.repository.get(&asset.id).unwrap()
    }

    fn record(&self, id: &AssetId) -> Asset {
        self.repository.get(id).unwrap()
    }

    fn clear_calls(&self) {
        self.store.clear_calls();
        self.queue.clear_calls();
    }
}

fn picture(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

fn png(width: u32, height: u32) -> Vec<u8> {
    encode_image(&picture(width, height), AssetFormat::Png).unwrap()
}

#[test]
fn transitions_with_unmet_preconditions_touch_nothing() {
    let harness = Harness::new(|kind| kind);
    let mut asset = Asset::new("photo");
    harness.lifecycle.save(&asset).unwrap();

    assert_eq!(
        harness.lifecycle.upload(&mut asset).unwrap(),
        Transition::Skipped {
            state: AssetState::Received
        }
    );
    assert!(!harness.lifecycle.process(&mut asset).unwrap().applied());
    assert!(
        !harness
            .lifecycle
            .upload_unprocessed(&mut asset)
            .unwrap()
            .applied()
    );

    assert_eq!(asset.state, AssetState::Received);
    assert_eq!(harness.stored(&asset).state, AssetState::Received);
    assert!(harness.store.calls().is_empty());
    assert!(harness.queue.calls().is_empty());
}

#[test]
fn moving_a_processed_asset_is_a_noop() {
    let harness = Harness::new(|kind| kind.defer(false).keep_original(false));
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(20, 10).into()))
        .unwrap();
    assert_eq!(asset.state, AssetState::Processed);
    harness.clear_calls();

    let transition = harness
        .lifecycle
        .move_asset(&mut asset, png(5, 5).into())
        .unwrap();
    assert!(!transition.applied());
    assert!(harness.store.calls().is_empty());
    assert!(harness.queue.calls().is_empty());
    assert!(!Staging::new(harness.staging.path()).exists(&asset.id));
}

#[test]
fn second_upload_creates_no_second_object() {
    let harness = Harness::new(|kind| kind.keep_original(false));
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(30, 20).into()))
        .unwrap();
    assert_eq!(asset.state, AssetState::Moved);
    assert_eq!(harness.queue.pending("images-upload").len(), 1);

    harness.lifecycle.upload(&mut asset).unwrap();
    assert_eq!(asset.state, AssetState::Uploaded);
    assert_eq!(harness.store.len(), 1);
    harness.clear_calls();

    let again = harness.lifecycle.upload(&mut asset).unwrap();
    assert_eq!(
        again,
        Transition::Skipped {
            state: AssetState::Uploaded
        }
    );
    assert_eq!(harness.store.len(), 1);
    assert!(harness.store.calls().is_empty());
    assert!(harness.queue.calls().is_empty());
}

#[test]
fn creating_without_input_is_rejected() {
    let harness = Harness::new(|kind| kind);
    let mut asset = Asset::new("photo");

    let result = harness.lifecycle.create(&mut asset, None);
    assert!(matches!(result, Err(AssetError::Validation(_))));
    assert_eq!(asset.state, AssetState::Received);
    assert!(harness.repository.is_empty());
    assert!(harness.store.calls().is_empty());
}

#[test]
fn unknown_kind_is_rejected_on_save() {
    let harness = Harness::new(|kind| kind);
    let result = harness.lifecycle.save(&Asset::new("video"));
    assert!(matches!(result, Err(AssetError::Validation(_))));
}

#[test]
fn pipeline_runs_in_order_and_records_final_size() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (first, second) = (order.clone(), order.clone());
    let harness = Harness::new(move |kind| {
        kind.defer(false)
            .keep_original(false)
            .process(Processor::image(move |image| {
                first.lock().unwrap().push("f1");
                Ok(image.crop_imm(0, 0, 40, 30))
            }))
            .process(Processor::image(move |image| {
                second.lock().unwrap().push("f2");
                Ok(image.thumbnail_exact(16, 12))
            }))
    });

    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(64, 48).into()))
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["f1", "f2"]);
    let stored = harness.stored(&asset);
    assert_eq!(stored.state, AssetState::Processed);
    assert_eq!((stored.width, stored.height), (16, 12));
    assert_eq!(stored.size(), "16x12");
    assert_eq!(stored.format, Some(AssetFormat::Png));

    let object = harness
        .store
        .object("images", &asset.remote_key(AssetFormat::Png))
        .unwrap();
    assert_eq!(image::load_from_memory(&object).unwrap().width(), 16);
}

#[test]
fn failing_processor_leaves_asset_uploaded() {
    let harness = Harness::new(|kind| {
        kind.defer(false)
            .keep_original(false)
            .process(Processor::image(|_| bail!("unsupported colour profile")))
    });
    let mut asset = Asset::new("photo");

    let result = harness
        .lifecycle
        .create(&mut asset, Some(png(8, 8).into()));
    assert!(matches!(result, Err(AssetError::Validation(_))));
    assert_eq!(harness.stored(&asset).state, AssetState::Uploaded);
    assert!(!Staging::new(harness.staging.path()).exists(&asset.id));
}

#[test]
fn sized_version_becomes_processed_child() {
    let harness = Harness::new(|kind| {
        kind.defer(false)
            .version(VersionSpec::sized("thumb", 100, 100))
    });
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(300, 200).into()))
        .unwrap();

    let parent = harness.stored(&asset);
    assert_eq!(parent.state, AssetState::Processed);
    let thumb = harness.record(&parent.derivatives["thumb"]);
    assert_eq!(thumb.name.as_deref(), Some("thumb"));
    assert_eq!(thumb.parent, Some(parent.id));
    assert_eq!(thumb.state, AssetState::Processed);
    assert_eq!((thumb.width, thumb.height), (100, 100));

    let thumb_key = thumb.remote_key(AssetFormat::Png);
    assert_eq!(thumb_key, format!("photos/{}/thumb.png", parent.id));
    assert_ne!(thumb_key, parent.remote_key(AssetFormat::Png));
    assert!(harness.store.object("images", &thumb_key).is_some());
    assert!(thumb.derivatives.is_empty());
}

#[test]
fn regenerating_versions_reuses_records_and_keys() {
    let harness = Harness::new(|kind| {
        kind.defer(false)
            .keep_original(false)
            .version(VersionSpec::sized("thumb", 10, 10))
    });
    let mut first = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut first, Some(png(40, 40).into()))
        .unwrap();
    let thumb_id = first.derivatives["thumb"];

    // Same parent id run through the lifecycle again
    let mut again = Asset::with_id(first.id, "photo");
    harness
        .lifecycle
        .create(&mut again, Some(png(50, 50).into()))
        .unwrap();

    assert_eq!(again.derivatives["thumb"], thumb_id);
    assert_eq!(harness.repository.len(), 2);
    assert_eq!(harness.store.len(), 2);
}

#[test]
fn original_keeps_the_uploaded_bytes() {
    let harness = Harness::new(|kind| kind.defer(false).format(AssetFormat::Jpg));
    let raw = png(24, 18);
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(raw.clone().into()))
        .unwrap();

    let original = harness.record(&asset.derivatives["original"]);
    assert_eq!(original.state, AssetState::Processed);
    assert_eq!(original.format, Some(AssetFormat::Png));
    assert_eq!((original.width, original.height), (24, 18));

    let original_key = format!("photos/{}/original.png", asset.id);
    assert_eq!(harness.store.object("images", &original_key), Some(raw));

    let canonical = harness
        .store
        .object("images", &format!("photos/{}.jpg", asset.id))
        .unwrap();
    assert_eq!(AssetFormat::guess(&canonical), Some(AssetFormat::Jpg));
}

#[test]
fn decoded_image_input_skips_staging() {
    let harness = Harness::new(|kind| kind.defer(false));
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(AssetInput::Image(picture(12, 9))))
        .unwrap();

    assert_eq!(asset.state, AssetState::Processed);
    assert_eq!((asset.width, asset.height), (12, 9));
    assert!(asset.derivatives.contains_key("original"));
    assert_eq!(
        std::fs::read_dir(harness.staging.path()).unwrap().count(),
        0
    );
}

#[test]
fn create_without_derivatives_skips_versions() {
    let harness = Harness::new(|kind| {
        kind.keep_original(false)
            .version(VersionSpec::sized("thumb", 10, 10))
    });
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create_without_derivatives(&mut asset, Some(png(30, 30).into()))
        .unwrap();

    assert_eq!(asset.state, AssetState::Processed);
    assert!(asset.derivatives.is_empty());
    assert!(harness.queue.calls().is_empty());
    assert_eq!(harness.repository.len(), 1);
}

#[test]
fn create_without_queue_ignores_deferral() {
    let harness = Harness::new(|kind| kind.version(VersionSpec::sized("thumb", 10, 10)));
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create_without_queue(&mut asset, Some(png(30, 30).into()))
        .unwrap();

    assert_eq!(asset.state, AssetState::Processed);
    let thumb = harness.record(&asset.derivatives["thumb"]);
    assert_eq!(thumb.state, AssetState::Processed);
    assert!(harness.queue.calls().is_empty());
}

#[test]
fn destroy_deletes_canonical_key_once() {
    let harness = Harness::new(|kind| kind.defer(false));
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(10, 10).into()))
        .unwrap();
    harness.clear_calls();

    harness.lifecycle.destroy(&asset).unwrap();

    let key = asset.remote_key(AssetFormat::Png);
    let deletes = harness
        .store
        .calls()
        .into_iter()
        .filter(|call| matches!(call, StoreCall::Delete { key: k, .. } if *k == key))
        .count();
    assert_eq!(deletes, 1);
    assert!(harness.repository.is_empty());
    assert!(harness.store.is_empty());
}

#[test]
fn url_points_at_canonical_key() {
    let harness = Harness::new(|kind| kind.bucket("media"));
    let asset = Asset::new("photo");
    assert_eq!(
        harness.lifecycle.url(&asset).unwrap(),
        format!("memory://media/photos/{}.png", asset.id)
    );
}

#[test]
fn deferred_flow_completes_through_the_worker() {
    let harness = Harness::new(|kind| kind.version(VersionSpec::sized("thumb", 8, 8)));
    let worker = Worker::new(harness.lifecycle.clone());
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(32, 32).into()))
        .unwrap();

    assert!(matches!(
        harness.queue.calls().as_slice(),
        [QueueCall::Push { queue, body }]
            if queue == "images-upload" && body.contains("\"hostname\":\"web-1\"")
    ));

    assert_eq!(
        worker.drain("photo", QueueKind::Upload),
        vec![WorkOutcome::Completed(asset.id), WorkOutcome::Idle]
    );
    assert_eq!(harness.stored(&asset).state, AssetState::Uploaded);

    let outcomes = worker.drain("photo", QueueKind::Process);
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], WorkOutcome::Completed(asset.id));

    let parent = harness.stored(&asset);
    assert_eq!(parent.state, AssetState::Processed);
    let thumb = harness.record(&parent.derivatives["thumb"]);
    assert_eq!(outcomes[1], WorkOutcome::Completed(thumb.id));
    assert_eq!(thumb.state, AssetState::Processed);
    assert_eq!((thumb.width, thumb.height), (8, 8));
    assert_eq!(harness.queue.in_flight(), 0);
}

#[test]
fn handle_moved_uploads_assets_staged_here() {
    let harness = Harness::new(|kind| kind.keep_original(false));
    let mut staged = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut staged, Some(png(10, 10).into()))
        .unwrap();

    // Moved elsewhere: no staged file on this host
    let mut foreign = Asset::new("photo");
    foreign.state = AssetState::Moved;
    harness.lifecycle.save(&foreign).unwrap();

    assert_eq!(harness.lifecycle.handle_moved("photo").unwrap(), 1);
    assert_eq!(harness.stored(&staged).state, AssetState::Uploaded);
    assert_eq!(harness.stored(&foreign).state, AssetState::Moved);
}

#[test]
fn path_and_reader_inputs_are_staged() {
    let harness = Harness::new(|kind| kind.defer(false).keep_original(false));
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("upload.png");
    std::fs::write(&source, png(6, 4)).unwrap();

    let mut from_path = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut from_path, Some(source.clone().into()))
        .unwrap();
    assert_eq!(from_path.size(), "6x4");
    assert!(source.exists());

    let mut from_reader = Asset::new("photo");
    let reader = std::io::Cursor::new(png(3, 2));
    harness
        .lifecycle
        .create(&mut from_reader, Some(AssetInput::Reader(Box::new(reader))))
        .unwrap();
    assert_eq!(from_reader.size(), "3x2");
}

#[test]
fn durable_backends_run_the_same_flow() {
    let dir = tempfile::tempdir().unwrap();
    let database = open_database(&dir.path().join("magpie.redb")).unwrap();
    let store = Arc::new(FsObjectStore::new(dir.path().join("objects")).unwrap());
    let queue = Arc::new(RedbQueue::new(database.clone(), Duration::from_secs(60)));
    let repository = Arc::new(RedbRepository::new(database));
    let kinds = KindRegistry::new()
        .with(
            AssetKindConfig::builder("photo")
                .staging_dir(dir.path().join("staging"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let lifecycle = Lifecycle::new(kinds, store, queue, repository.clone(), "web-1");
    let worker = Worker::new(lifecycle.clone());

    let mut asset = Asset::new("photo");
    lifecycle
        .create(&mut asset, Some(png(16, 16).into()))
        .unwrap();
    worker.drain("photo", QueueKind::Upload);
    worker.drain("photo", QueueKind::Process);

    let stored = repository.load(&asset.id).unwrap().unwrap();
    assert_eq!(stored.state, AssetState::Processed);
    assert!(
        dir.path()
            .join("objects/images")
            .join(asset.remote_key(AssetFormat::Png))
            .is_file()
    );
    assert!(
        dir.path()
            .join(format!("objects/images/photos/{}/original.png", asset.id))
            .is_file()
    );
}

#[test]
fn inline_and_deferred_pipelines_see_the_same_image() {
    let translucent = DynamicImage::ImageRgba8(image::RgbaImage::from_fn(24, 16, |x, y| {
        image::Rgba([(x * 10) as u8, (y * 15) as u8, 200, ((x + y) * 6) as u8])
    }));
    let source = encode_image(&translucent, AssetFormat::Png).unwrap();

    let seen_by = |deferred: bool| {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let harness = Harness::new(move |kind| {
            kind.format(AssetFormat::Jpg)
                .keep_original(false)
                .process(Processor::image(move |image| {
                    sink.lock()
                        .unwrap()
                        .push((image.color(), image.as_bytes().to_vec()));
                    Ok(image)
                }))
        });
        let mut asset = Asset::new("photo");
        if deferred {
            harness
                .lifecycle
                .create(&mut asset, Some(source.clone().into()))
                .unwrap();
            let worker = Worker::new(harness.lifecycle.clone());
            worker.drain("photo", QueueKind::Upload);
            worker.drain("photo", QueueKind::Process);
        } else {
            harness
                .lifecycle
                .create_without_queue(&mut asset, Some(source.clone().into()))
                .unwrap();
        }
        assert_eq!(harness.stored(&asset).state, AssetState::Processed);
        let seen = seen.lock().unwrap().clone();
        seen
    };

    let inline = seen_by(false);
    let deferred = seen_by(true);
    assert_eq!(inline.len(), 1);
    assert_eq!(inline[0].0, image::ColorType::Rgb8);
    assert_eq!(inline, deferred);
}

#[test]
fn refused_process_push_is_retried_by_the_upload_job() {
    let harness = Harness::new(|kind| kind.version(VersionSpec::sized("thumb", 8, 8)));
    let worker = Worker::new(harness.lifecycle.clone());
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(32, 32).into()))
        .unwrap();
    harness.queue.fail_pushes("images", 1);

    // The object lands and the record says uploaded, but process never queued
    assert_eq!(
        worker.work_off("photo", QueueKind::Upload),
        WorkOutcome::Failed(Some(asset.id))
    );
    assert_eq!(harness.stored(&asset).state, AssetState::Uploaded);
    assert!(harness.queue.pending("images").is_empty());
    let objects = harness.store.len();

    harness.queue.redeliver();
    assert_eq!(
        worker.drain("photo", QueueKind::Upload),
        vec![WorkOutcome::Completed(asset.id), WorkOutcome::Idle]
    );
    assert_eq!(harness.store.len(), objects);
    assert_eq!(harness.queue.pending("images").len(), 1);

    worker.drain("photo", QueueKind::Process);
    let parent = harness.stored(&asset);
    assert_eq!(parent.state, AssetState::Processed);
    assert_eq!(
        harness.record(&parent.derivatives["thumb"]).state,
        AssetState::Processed
    );
    assert_eq!(
        harness.record(&parent.derivatives["original"]).state,
        AssetState::Processed
    );
    assert_eq!(harness.queue.in_flight(), 0);
}

#[test]
fn stray_staged_file_does_not_block_processing() {
    let harness = Harness::new(|kind| kind.keep_original(false));
    let worker = Worker::new(harness.lifecycle.clone());
    let staging = Staging::new(harness.staging.path());
    let mut asset = Asset::new("photo");
    harness
        .lifecycle
        .create(&mut asset, Some(png(16, 16).into()))
        .unwrap();
    worker.drain("photo", QueueKind::Upload);
    assert_eq!(harness.stored(&asset).state, AssetState::Uploaded);

    // A leftover the upload could not clear does not affect later steps
    std::fs::create_dir_all(staging.path(&asset.id).join("held")).unwrap();
    assert_eq!(
        worker.drain("photo", QueueKind::Process),
        vec![WorkOutcome::Completed(asset.id), WorkOutcome::Idle]
    );
    assert_eq!(harness.stored(&asset).state, AssetState::Processed);
    assert_eq!(harness.lifecycle.handle_moved("photo").unwrap(), 0);
}
