//! Concurrent writing, live observation, and event semantics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ndtiff::{Dataset, ImageCoords, ImageData, IndexEntry, NdStorage};
use serde_json::json;

use super::test_utils::mono16_fill;

#[test]
fn test_concurrent_writer_and_reader() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Arc::new(Dataset::create(dir.path(), None).unwrap());
    dataset.initialize(json!({}));

    let queue: Arc<Mutex<VecDeque<(i32, ImageData)>>> = Arc::new(Mutex::new(VecDeque::new()));
    let running = Arc::new(AtomicBool::new(true));

    // background thread drains the queue into the dataset
    let writer = {
        let dataset = Arc::clone(&dataset);
        let queue = Arc::clone(&queue);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            loop {
                let item = queue.lock().unwrap().pop_front();
                match item {
                    Some((time, image)) => {
                        dataset
                            .put_image(
                                &ImageCoords::new().time(time),
                                &image,
                                &json!({"time_metadata": time}),
                            )
                            .unwrap();
                    }
                    None => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        })
    };

    for time in 0..10 {
        queue
            .lock()
            .unwrap()
            .push_back((time, mono16_fill(256, 256, time as u16)));
        // poke at the dataset while the writer is running
        if dataset.has_image(&ImageCoords::new().time(time)) {
            let image = dataset.read_image(&ImageCoords::new().time(time)).unwrap();
            assert_eq!(image.sample(0, 0, 0), time as u64);
        }
    }

    // wait for the queue to drain, then stop the writer
    while !queue.lock().unwrap().is_empty() {
        thread::sleep(Duration::from_millis(1));
    }
    running.store(false, Ordering::SeqCst);
    writer.join().unwrap();
    dataset.finish().unwrap();

    // everything written is readable with correct pixels and metadata
    let reopened = Dataset::open(dir.path()).unwrap();
    for time in 0..10 {
        let coordinates = ImageCoords::new().time(time);
        let image = reopened.read_image(&coordinates).unwrap();
        assert_eq!(image.sample(0, 0, 0), time as u64);
        assert_eq!(image.sample(255, 255, 0), time as u64);
        assert_eq!(
            reopened.read_metadata(&coordinates).unwrap(),
            json!({"time_metadata": time})
        );
    }
}

#[test]
fn test_await_new_image_wakes_on_put() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Arc::new(Dataset::create(dir.path(), None).unwrap());
    dataset.initialize(json!({}));

    let waiter = {
        let dataset = Arc::clone(&dataset);
        thread::spawn(move || dataset.await_new_image(Some(Duration::from_secs(10))))
    };
    thread::sleep(Duration::from_millis(20));
    dataset
        .put_image(&ImageCoords::new().time(0), &mono16_fill(8, 8, 1), &json!({}))
        .unwrap();
    assert!(waiter.join().unwrap());

    // the signal auto-resets, so a fresh wait times out
    assert!(!dataset.await_new_image(Some(Duration::from_millis(10))));
    dataset.finish().unwrap();
}

#[test]
fn test_block_until_finished() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Arc::new(Dataset::create(dir.path(), None).unwrap());
    dataset.initialize(json!({}));

    assert!(!dataset.is_finished());
    assert!(!dataset.block_until_finished(Some(Duration::from_millis(10))));

    let finisher = {
        let dataset = Arc::clone(&dataset);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            dataset.finish().unwrap();
        })
    };
    assert!(dataset.block_until_finished(Some(Duration::from_secs(10))));
    finisher.join().unwrap();
    assert!(dataset.is_finished());
}

#[test]
fn test_live_view_follows_external_index() {
    let dir = tempfile::tempdir().unwrap();

    // one process writes the dataset...
    let writer = Dataset::create(dir.path(), None).unwrap();
    writer.initialize(json!({"Prefix": "live"}));
    for time in 0..5 {
        writer
            .put_image(
                &ImageCoords::new().time(time),
                &mono16_fill(32, 32, (time * 2) as u16),
                &json!({"t": time}),
            )
            .unwrap();
    }
    writer.finish().unwrap();

    // ...while another follows the index file, one record at a time
    let live = Dataset::live(dir.path(), json!({"Prefix": "live"})).unwrap();
    assert!(!live.has_image(&ImageCoords::new().time(0)));

    let index_bytes = std::fs::read(dir.path().join("NDTiff.index")).unwrap();
    let mut position = 0;
    let mut seen = 0;
    while let Some((entry, next)) = IndexEntry::decode(&index_bytes, position).unwrap() {
        let coordinates = live.add_index_entry(entry, true).unwrap();
        assert!(live.has_image(&coordinates));
        // each installed entry is readable right away
        let image = live.read_image(&coordinates).unwrap();
        assert_eq!(image.sample(0, 0, 0), (seen * 2) as u64);
        position = next;
        seen += 1;
    }
    assert_eq!(seen, 5);
    assert_eq!(
        live.read_metadata(&ImageCoords::new().time(3)).unwrap()["t"],
        3
    );
    assert_eq!(live.get_image_coordinates_list().len(), 5);
}

#[test]
fn test_parallel_reads_from_one_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::create(dir.path(), None).unwrap();
    dataset.initialize(json!({}));
    for time in 0..8 {
        dataset
            .put_image(
                &ImageCoords::new().time(time),
                &mono16_fill(64, 64, time as u16),
                &json!({}),
            )
            .unwrap();
    }
    dataset.finish().unwrap();

    let dataset = Arc::new(Dataset::open(dir.path()).unwrap());
    let mut handles = Vec::new();
    for worker in 0..4 {
        let dataset = Arc::clone(&dataset);
        handles.push(thread::spawn(move || {
            for round in 0..50 {
                let time = (worker + round) % 8;
                let image = dataset
                    .read_image(&ImageCoords::new().time(time as i32))
                    .unwrap();
                assert_eq!(image.sample(0, 0, 0), time as u64);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
