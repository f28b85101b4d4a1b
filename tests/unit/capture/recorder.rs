use super::*;

use std::sync::{Arc, Mutex};

use crate::capture::stream::StreamState;
use crate::delivery::{DeliveryMode, DeliveryObserver, decode_payload};
use crate::foundation::core::FrameIndex;

/// In-memory stream: one chunk per pushed frame (the frame's first byte), and a stop that
/// reports completion twice.
#[derive(Default)]
struct FakeStream {
    state: Option<StreamState>,
    pending: Vec<StreamEvent>,
    frames: u64,
    stop_calls: u32,
    fail_on_frame: Option<u64>,
}

impl CaptureStream for FakeStream {
    fn start(&mut self, _cfg: &StreamConfig) -> SpinloopResult<()> {
        self.state = Some(StreamState::Recording);
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> SpinloopResult<()> {
        self.frames += 1;
        if self.fail_on_frame == Some(self.frames) {
            self.pending.push(StreamEvent::Failed("encoder crashed".to_owned()));
        }
        self.pending.push(StreamEvent::Chunk(vec![frame.data[0]]));
        Ok(())
    }

    fn request_stop(&mut self) -> StopOutcome {
        self.stop_calls += 1;
        match self.state() {
            StreamState::Recording => {
                self.state = Some(StreamState::Stopping);
                self.pending.push(StreamEvent::Stopped);
                self.pending.push(StreamEvent::Stopped);
                StopOutcome::Stopping
            }
            other => StopOutcome::NotRecording(other),
        }
    }

    fn state(&self) -> StreamState {
        self.state.unwrap_or(StreamState::Inactive)
    }

    fn poll_events(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.pending)
    }
}

struct AllEncoders;

impl EncoderSupport for AllEncoders {
    fn supports(&self, _encoder: &str) -> bool {
        true
    }
}

#[derive(Clone, Default)]
struct Notices(Arc<Mutex<Vec<DeliveryNotice>>>);

impl DeliveryObserver for Notices {
    fn notify(&mut self, notice: &DeliveryNotice) -> SpinloopResult<()> {
        self.0.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

const SETTLE: Duration = Duration::from_millis(300);
const TICK: Duration = Duration::from_millis(100);

fn plan(target: u64) -> RecordingPlan {
    RecordingPlan {
        surface: Canvas {
            width: 4,
            height: 4,
        },
        target_frame_count: target,
        fps: Fps::integer(10).unwrap(),
        mime_candidates: vec!["video/webm;codecs=vp9".to_owned()],
        background: Rgba8::BLACK,
    }
}

fn frame(tag: u8) -> FrameRGBA {
    FrameRGBA::solid(
        Canvas {
            width: 4,
            height: 4,
        },
        [tag, 0, 0, 255],
    )
}

fn recorder(stream: FakeStream) -> (Recorder<FakeStream>, Notices) {
    let notices = Notices::default();
    let delivery = Delivery::new(DeliveryMode::Inline, None)
        .with_download_dir("target/unit_recorder")
        .with_observer(Box::new(notices.clone()));
    (Recorder::new(stream, SETTLE, delivery), notices)
}

fn boundary() -> LoopBoundary {
    LoopBoundary::for_tests(1.0, FrameIndex(42))
}

#[test]
fn records_exactly_target_frames_and_delivers_once() {
    let (mut rec, notices) = recorder(FakeStream::default());
    assert_eq!(rec.status(), RecordingStatus::Idle);

    rec.arm(boundary(), &plan(5), &AllEncoders, Duration::ZERO)
        .unwrap();
    assert_eq!(rec.status(), RecordingStatus::ArmedWaitingForLoopStart);

    let mut now = Duration::ZERO;
    let mut all = Vec::new();
    for i in 0..20u8 {
        now += TICK;
        all.extend(rec.on_tick(now, &frame(i)).unwrap());
    }
    all.extend(rec.pump().unwrap());

    let session = rec.session().unwrap();
    assert_eq!(session.status(), RecordingStatus::Complete);
    assert_eq!(session.frames_observed(), 5);
    assert_eq!(rec.stream().frames, 5);
    assert_eq!(rec.stream().stop_calls, 1);

    let started = all
        .iter()
        .filter(|e| matches!(e, RecorderEvent::Started { .. }))
        .count();
    let delivered: Vec<_> = all
        .iter()
        .filter_map(|e| match e {
            RecorderEvent::Delivered(n) => Some(n.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(started, 1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(notices.0.lock().unwrap().len(), 1);

    // Ticks at 100ms..200ms fall inside the settle delay; the first frame captured is tick 3.
    let bytes = decode_payload(&delivered[0]).unwrap();
    assert_eq!(bytes, vec![2, 3, 4, 5, 6]);
    assert_eq!(delivered[0].mime_type, "video/webm;codecs=vp9");
}

#[test]
fn frames_are_not_counted_outside_recording() {
    let (mut rec, _) = recorder(FakeStream::default());
    rec.on_tick(TICK, &frame(0)).unwrap();
    assert!(rec.session().is_none());
    assert_eq!(rec.stream().frames, 0);

    rec.arm(boundary(), &plan(2), &AllEncoders, TICK).unwrap();
    rec.on_tick(TICK * 2, &frame(1)).unwrap();
    assert_eq!(rec.session().unwrap().frames_observed(), 0);

    rec.on_tick(TICK * 5, &frame(2)).unwrap();
    rec.on_tick(TICK * 6, &frame(3)).unwrap();
    assert_eq!(rec.session().unwrap().frames_observed(), 2);
    for k in 7..12 {
        rec.on_tick(TICK * k, &frame(9)).unwrap();
    }
    assert_eq!(rec.session().unwrap().frames_observed(), 2);
    assert_eq!(rec.status(), RecordingStatus::Complete);
}

#[test]
fn arm_is_single_use_and_validates() {
    let (mut rec, _) = recorder(FakeStream::default());
    assert!(
        rec.arm(boundary(), &plan(0), &AllEncoders, Duration::ZERO)
            .is_err()
    );
    rec.arm(boundary(), &plan(3), &AllEncoders, Duration::ZERO)
        .unwrap();
    assert!(
        rec.arm(boundary(), &plan(3), &AllEncoders, Duration::ZERO)
            .is_err()
    );
    assert_eq!(rec.session().unwrap().boundary().frame(), FrameIndex(42));
}

#[test]
fn stop_while_not_recording_is_a_noop() {
    let (mut rec, _) = recorder(FakeStream::default());
    assert_eq!(
        rec.request_stop(),
        StopOutcome::NotRecording(StreamState::Inactive)
    );
    assert_eq!(rec.status(), RecordingStatus::Idle);
}

#[test]
fn finalize_is_guarded() {
    let (mut rec, notices) = recorder(FakeStream::default());
    rec.arm(boundary(), &plan(1), &AllEncoders, Duration::ZERO)
        .unwrap();
    rec.on_tick(SETTLE, &frame(7)).unwrap();
    rec.pump().unwrap();
    assert_eq!(rec.status(), RecordingStatus::Complete);
    assert!(rec.finalize().unwrap().is_none());
    assert_eq!(notices.0.lock().unwrap().len(), 1);
}

#[test]
fn stream_failure_fails_the_session() {
    let stream = FakeStream {
        fail_on_frame: Some(2),
        ..FakeStream::default()
    };
    let (mut rec, notices) = recorder(stream);
    rec.arm(boundary(), &plan(10), &AllEncoders, Duration::ZERO)
        .unwrap();
    rec.on_tick(SETTLE, &frame(0)).unwrap();
    rec.on_tick(SETTLE + TICK, &frame(1)).unwrap();
    let err = rec.on_tick(SETTLE + TICK * 2, &frame(2)).unwrap_err();
    assert!(err.to_string().contains("encoder crashed"));
    assert_eq!(rec.status(), RecordingStatus::Failed);
    assert!(notices.0.lock().unwrap().is_empty());
}

#[test]
fn unsupported_candidates_fall_back() {
    struct NoEncoders;
    impl EncoderSupport for NoEncoders {
        fn supports(&self, _encoder: &str) -> bool {
            false
        }
    }
    let (mut rec, _) = recorder(FakeStream::default());
    rec.arm(boundary(), &plan(1), &NoEncoders, Duration::ZERO)
        .unwrap();
    assert_eq!(rec.session().unwrap().mime_type(), "video/webm");
}
