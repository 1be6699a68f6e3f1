//! Test helpers for kiosk-ads integration tests
//!
//! - ScriptedBatchSource: answers fetches from a script, tracks concurrency
//! - MockSurface: records surface calls, applies a configurable autoplay policy
//! - ExitRecorder: captures exit callback invocations

#![allow(dead_code)]

use async_trait::async_trait;
use kiosk_ads::activity::ActivityRegistry;
use kiosk_ads::config::PlaybackSettings;
use kiosk_ads::playback::EngineDeps;
use kiosk_ads::source::BatchSource;
use kiosk_ads::surface::{PlaybackSurface, SurfaceEvents};
use kiosk_ads::{Error, Result};
use kiosk_common::events::ExitReason;
use kiosk_common::{Ad, DeviceId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ad(id: &str) -> Ad {
    Ad::new(id, format!("https://cdn.example/{id}.mp4"))
}

pub fn ads(ids: &[&str]) -> Vec<Ad> {
    ids.iter().map(|id| ad(id)).collect()
}

/// Let every ready task run without advancing past any pending timer
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ----------------------------------------
// Batch source
// ----------------------------------------

pub enum Scripted {
    Ads(Vec<Ad>),
    Fail(String),
    /// Answer after a delay
    Delayed(Duration, Vec<Ad>),
}

#[derive(Default)]
pub struct ScriptedBatchSource {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBatchSource {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BatchSource for ScriptedBatchSource {
    async fn fetch(&self, _device_id: &DeviceId) -> Result<Vec<Ad>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ads(ads)) => Ok(ads),
            Some(Scripted::Fail(reason)) => Err(Error::Fetch(reason)),
            Some(Scripted::Delayed(delay, ads)) => {
                tokio::time::sleep(delay).await;
                Ok(ads)
            }
            None => Err(Error::Fetch("script exhausted".to_string())),
        }
    }
}

// ----------------------------------------
// Playback surface
// ----------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPolicy {
    AllowAll,
    /// Only muted starts succeed
    MutedOnly,
    RejectAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Load(String),
    Start { muted: bool, accepted: bool },
    Pause,
}

pub struct MockSurface {
    events: Mutex<Option<SurfaceEvents>>,
    calls: Mutex<Vec<SurfaceCall>>,
    policy: Mutex<StartPolicy>,
    muted: Mutex<bool>,
    playing: Mutex<bool>,
}

impl MockSurface {
    pub fn new(policy: StartPolicy) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            policy: Mutex::new(policy),
            muted: Mutex::new(false),
            playing: Mutex::new(false),
        })
    }

    pub fn set_policy(&self, policy: StartPolicy) {
        *self.policy.lock().unwrap() = policy;
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Load(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn start_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Start { .. }))
            .count()
    }

    pub fn pause_calls(&self) -> usize {
        self.calls().iter().filter(|c| **c == SurfaceCall::Pause).count()
    }

    pub fn is_playing(&self) -> bool {
        *self.playing.lock().unwrap()
    }

    /// Simulate the media "ended" callback
    pub fn finish_current(&self) {
        *self.playing.lock().unwrap() = false;
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            events.ended();
        }
    }

    /// Simulate a media error callback
    pub fn fail_current(&self, message: &str) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            events.error(message);
        }
    }
}

#[async_trait]
impl PlaybackSurface for MockSurface {
    fn attach(&self, events: SurfaceEvents) {
        *self.events.lock().unwrap() = Some(events);
    }

    fn load(&self, ad: &Ad) {
        *self.playing.lock().unwrap() = false;
        self.calls.lock().unwrap().push(SurfaceCall::Load(ad.id.clone()));
    }

    async fn start(&self) -> Result<()> {
        let muted = *self.muted.lock().unwrap();
        let accepted = match *self.policy.lock().unwrap() {
            StartPolicy::AllowAll => true,
            StartPolicy::MutedOnly => muted,
            StartPolicy::RejectAll => false,
        };
        self.calls.lock().unwrap().push(SurfaceCall::Start { muted, accepted });

        if accepted {
            *self.playing.lock().unwrap() = true;
            Ok(())
        } else {
            Err(Error::Surface("NotAllowedError".to_string()))
        }
    }

    fn pause(&self) {
        *self.playing.lock().unwrap() = false;
        self.calls.lock().unwrap().push(SurfaceCall::Pause);
    }

    fn set_muted(&self, muted: bool) {
        *self.muted.lock().unwrap() = muted;
    }

    fn is_muted(&self) -> bool {
        *self.muted.lock().unwrap()
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn duration(&self) -> f64 {
        0.0
    }
}

// ----------------------------------------
// Exit callback
// ----------------------------------------

#[derive(Clone, Default)]
pub struct ExitRecorder {
    reasons: Arc<Mutex<Vec<ExitReason>>>,
}

impl ExitRecorder {
    pub fn callback(&self) -> impl FnOnce(ExitReason) + Send + 'static {
        let reasons = Arc::clone(&self.reasons);
        move |reason| reasons.lock().unwrap().push(reason)
    }

    pub fn reasons(&self) -> Vec<ExitReason> {
        self.reasons.lock().unwrap().clone()
    }
}

pub fn deps(
    source: Arc<ScriptedBatchSource>,
    surface: Arc<MockSurface>,
    registry: Arc<ActivityRegistry>,
) -> EngineDeps {
    EngineDeps {
        source,
        surface,
        activity: registry,
        device_id: DeviceId::new("lobby-01").unwrap(),
        settings: PlaybackSettings::default(),
    }
}
