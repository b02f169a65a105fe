use gf_emu::communication::{EventSink, RecordingSink};
use gf_emu::config::EmulatorConfig;
use gf_emu::device::{ActionRequest, ActionType, CameraSettings, Device, Services};
use gf_emu::pulse::{LinearProfile, MotionHeader, PulseFile, STEP_FREQUENCY_KEY, generate_linear_with};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const IMAGES: [&str; 7] = [
    "HOME_1.jpg",
    "HOME_2.jpg",
    "HOME_3.jpg",
    "HOME_4.jpg",
    "LID_IMAGE.jpg",
    "HEAD_LASER_0.125.jpg",
    "HEAD_NO_LASER_0.125.jpg",
];

struct Bench {
    root: TempDir,
    config: EmulatorConfig,
}

impl Bench {
    fn new(bypass_homing: bool) -> Self {
        let root = tempfile::tempdir().unwrap();
        let images = root.path().join("images");
        std::fs::create_dir(&images).unwrap();
        for name in IMAGES {
            std::fs::write(images.join(name), name.as_bytes()).unwrap();
        }
        let mut config = EmulatorConfig::default();
        config.emulator.image_src_dir = images;
        config.emulator.motion_dl_dir = root.path().join("downloads");
        config.emulator.upload_dir = root.path().join("uploads");
        config.emulator.bypass_homing = bypass_homing;
        Self { root, config }
    }

    fn start(&self) -> (Device, Arc<RecordingSink>) {
        let events = Arc::new(RecordingSink::new());
        let services = Services::emulated(&self.config, events.clone() as Arc<dyn EventSink>);
        (Device::start(services).unwrap(), events)
    }

    fn pulse_file(&self, dx: i64, dy: i64) -> (PathBuf, PulseFile) {
        let mut header = MotionHeader::new();
        header.insert(STEP_FREQUENCY_KEY, 1000);
        let profile = LinearProfile {
            laser: true,
            ..LinearProfile::default()
        };
        let file = PulseFile::new(header, generate_linear_with(dx, dy, &profile));
        let path = self.root.path().join("job.puls");
        file.save(&path).unwrap();
        (path, file)
    }

    fn raw_file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.root.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn files_in(&self, dir: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.root.path().join(dir))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

fn wait_for(events: &RecordingSink, id: u64, event: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !events.names_for(id).iter().any(|n| n == event) {
        assert!(Instant::now() < deadline, "timed out waiting for {} on #{}", event, id);
        thread::sleep(Duration::from_millis(2));
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or_default()
}

#[test]
fn motion_download_stores_body_and_info() {
    let bench = Bench::new(true);
    let (url, file) = bench.pulse_file(300, -120);
    let (device, events) = bench.start();

    let request = ActionRequest::ready(41, ActionType::Motion).with_motion_url(format!("file://{}", url.display()));
    device.submit(request);
    wait_for(&events, 41, "motion:reset");

    let names = events.names_for(41);
    assert_eq!(names[..3], ["motion:received", "motion:starting", "motion:download:starting"]);
    assert!(names.contains(&"motion:download:completed".to_string()));
    assert!(names.contains(&"motion:completed".to_string()));
    let download = events.find("motion:download:starting").unwrap().data.unwrap();
    assert!(download.value.as_str().unwrap().ends_with("job.puls"));

    assert!(device.shutdown(Duration::from_secs(5)));

    let stored = bench.files_in("downloads");
    assert_eq!(stored.len(), 2);
    let info = stored.iter().find(|p| extension(p) == "info").unwrap();
    let body = stored.iter().find(|p| extension(p) == "puls").unwrap();
    assert!(body.file_name().unwrap().to_str().unwrap().ends_with("_motion.puls"));
    assert_eq!(std::fs::read(body).unwrap(), file.body());

    let info: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(info).unwrap()).unwrap();
    assert_eq!(info["size"], file.body().len());
    // Every byte of a laser move carries the enable flag.
    let laser_secs = file.body().len() as f64 / 1000.0;
    assert!((info["laser_on_time"].as_f64().unwrap() - laser_secs).abs() < 1e-9);
    assert_eq!(info["run_time"], info["laser_on_time"]);
    assert_eq!(info["stats"]["LE"], file.body().len());
    assert_eq!(info["header_data"]["STfr"], 1000);
    assert_eq!(info["stats"]["XEND"], 300);
    assert_eq!(info["stats"]["YEND"], -120);
    assert_eq!(info["stats"]["XP"], 300);
    assert_eq!(info["stats"]["YN"], 120);
}

#[test]
fn missing_motion_file_cancels_with_log() {
    let bench = Bench::new(true);
    let (device, events) = bench.start();
    let missing = bench.root.path().join("missing.puls");

    device.submit(ActionRequest::ready(5, ActionType::Print).with_motion_url(missing.display().to_string()));
    wait_for(&events, 5, "print:reset");

    let cancelled = events.find("print:cancelled").unwrap();
    assert_eq!(cancelled.action_id, Some(5));
    assert_eq!(cancelled.data.unwrap().key, "log");
    assert!(!events.names_for(5).contains(&"print:completed".to_string()));
    assert!(device.shutdown(Duration::from_secs(5)));
}

#[test]
fn corrupt_motion_files_cancel_only_that_action() {
    let bench = Bench::new(true);
    let foreign = bench.raw_file("foreign.puls", b"\x01GF2\x10\x00\x00\x00ABCD\x01\x00\x00\x00\x11\x00");
    // Declares 0x20 header bytes; only one record follows.
    let truncated = bench.raw_file("truncated.puls", b"\x01GF1\x20\x00\x00\x00ABCD\x01\x00\x00\x00");
    let (device, events) = bench.start();

    for (id, url) in [(11, &foreign), (12, &truncated)] {
        device.submit(ActionRequest::ready(id, ActionType::Motion).with_motion_url(url.display().to_string()));
        wait_for(&events, id, "motion:reset");

        let names = events.names_for(id);
        assert!(names.contains(&"motion:cancelled".to_string()));
        assert!(!names.contains(&"motion:completed".to_string()));
        let cancelled = events
            .events()
            .into_iter()
            .find(|e| e.action_id == Some(id) && e.event == "motion:cancelled")
            .unwrap();
        let log = cancelled.data.unwrap();
        assert_eq!(log.key, "log");
        let text = log.value.as_str().unwrap().to_string();
        if id == 11 {
            assert!(text.contains("bad magic"), "{}", text);
        } else {
            assert!(text.contains("malformed header"), "{}", text);
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while !device.is_idle() {
            assert!(Instant::now() < deadline, "device stayed busy after #{}", id);
            thread::sleep(Duration::from_millis(2));
        }
    }

    // No partial download is kept.
    assert!(bench.files_in("downloads").is_empty());

    // The guard was released: the next request runs normally.
    device.submit(ActionRequest::ready(13, ActionType::Hunt));
    wait_for(&events, 13, "hunt:reset");
    assert!(events.names_for(13).contains(&"hunt:completed".to_string()));
    assert!(device.shutdown(Duration::from_secs(5)));
}

#[test]
fn print_waits_for_button_then_runs() {
    let bench = Bench::new(true);
    let (url, _) = bench.pulse_file(10, 10);
    let (device, events) = bench.start();

    device.submit(ActionRequest::ready(6, ActionType::Print).with_motion_url(url.display().to_string()));
    wait_for(&events, 6, "print:reset");

    let names = events.names();
    let pressed = names.iter().position(|n| n == "button:pressed").unwrap();
    let waiting = names.iter().position(|n| n == "print:waiting").unwrap();
    let completed = names.iter().position(|n| n == "print:completed").unwrap();
    assert!(waiting < pressed && pressed < completed);
    assert_eq!(events.find("button:pressed").unwrap().action_id, None);
    assert!(device.shutdown(Duration::from_secs(5)));
}

#[test]
fn lid_images_follow_the_homing_sequence() {
    let bench = Bench::new(false);
    let (device, events) = bench.start();

    for id in 1..=5 {
        device.submit(ActionRequest::ready(id, ActionType::LidImage));
        wait_for(&events, id, "lid_image:reset");
    }
    assert!(device.shutdown(Duration::from_secs(5)));

    let uploads: Vec<String> = bench
        .files_in("uploads")
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        uploads,
        vec![
            "1_lid_image_HOME_1.jpg",
            "2_lid_image_HOME_2.jpg",
            "3_lid_image_HOME_3.jpg",
            "4_lid_image_HOME_4.jpg",
            "5_lid_image_LID_IMAGE.jpg",
        ]
    );
    let stored = std::fs::read(bench.root.path().join("uploads/5_lid_image_LID_IMAGE.jpg")).unwrap();
    assert_eq!(stored, b"LID_IMAGE.jpg");
}

#[test]
fn head_and_lidar_images_pick_laser_variant() {
    let bench = Bench::new(true);
    let (device, events) = bench.start();

    device.submit(ActionRequest::ready(7, ActionType::HeadImage).with_settings(vec![CameraSettings::illuminated(1)]));
    wait_for(&events, 7, "head_image:reset");
    device.submit(ActionRequest::ready(8, ActionType::LidarImage));
    wait_for(&events, 8, "lidar_image:reset");
    assert!(device.shutdown(Duration::from_secs(5)));

    let uploads: Vec<String> = bench
        .files_in("uploads")
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        uploads,
        vec![
            "7_head_image_HEAD_LASER_0.125.jpg",
            "8_lidar_image_HEAD_LASER_0.125.jpg",
            "8_lidar_image_HEAD_NO_LASER_0.125.jpg",
        ]
    );
    let capture = events.find("lidar_image:capture:completed").unwrap();
    assert_eq!(capture.data.unwrap().value, "capture time: 2.514");
}

#[test]
fn settings_report_is_sent_once() {
    let bench = Bench::new(false);
    let (device, events) = bench.start();

    device.submit(ActionRequest::ready(1, ActionType::Settings));
    device.submit(ActionRequest::ready(2, ActionType::Settings));

    let reports: Vec<serde_json::Value> = events
        .events()
        .into_iter()
        .filter(|e| e.event == "settings:completed")
        .map(|e| e.data.unwrap().value)
        .collect();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["values"]["SAid"], 1);
    assert_eq!(reports[0]["values"]["MCsn"], 100000001);
    assert_eq!(reports[1], serde_json::json!({}));
    assert!(device.shutdown(Duration::from_secs(5)));
}
