/// Shared fixtures: synthetic detections and on-disk archives.
use ndarray::Array2;
use specev::{
    write_reference_archive, Detector, EventSet, FindEventsParams, HarnessConfig, ReplayDetector,
    StWriter, Event,
};
use std::cell::Cell;
use std::path::Path;

#[allow(unused)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `n_trials` trials with 0–4 beta events each, in ascending peak time.
#[allow(unused)]
pub fn synthetic_events(n_trials: usize) -> EventSet {
    let trials = (0..n_trials)
        .map(|i| {
            let n_ev = (i * 7 + 3) % 5;
            (0..n_ev)
                .map(|k| {
                    let t = 0.05 + 0.2 * k as f64 + 0.001 * (i % 10) as f64;
                    let f = 15.0 + ((i + k) % 14) as f64;
                    Event {
                        peak_time: t,
                        peak_freq: f,
                        low_freq: f - 2.0,
                        high_freq: f + 2.0,
                        onset: t - 0.03,
                        offset: t + 0.04,
                        peak_power: 6.0 + ((i * 3 + k) % 7) as f64 * 0.5,
                    }
                })
                .collect()
        })
        .collect();
    EventSet::from_trials(trials)
}

/// Write a reference archive for `reference` and a matching raw-signal
/// archive into `dir`, and return a config pointing at them.
#[allow(unused)]
pub fn write_fixture(dir: &Path, reference: &EventSet, method: i64) -> HarnessConfig {
    let cfg = HarnessConfig { method, data_dir: dir.to_path_buf(), ..HarnessConfig::default() };

    write_reference_archive(reference, &cfg.reference_archive_path().unwrap()).unwrap();

    let raw_path = cfg.raw_signal_path();
    std::fs::create_dir_all(raw_path.parent().unwrap()).unwrap();
    let signal = Array2::from_shape_fn((cfg.n_times, reference.n_trials()), |(t, k)| {
        ((t as f64) * 0.13 + k as f64).sin() * 1e-12
    });
    let mut w = StWriter::new();
    w.add_f64_arr2(&cfg.raw_signal_key, &signal);
    w.write(&raw_path).unwrap();

    cfg
}

/// Replays stored events and counts how often each stage runs.
#[allow(unused)]
pub struct CountingDetector {
    inner: ReplayDetector,
    pub tfr_calls: Cell<usize>,
    pub find_calls: Cell<usize>,
}

#[allow(unused)]
impl CountingDetector {
    pub fn new(events: EventSet) -> Self {
        Self { inner: ReplayDetector::new(events), tfr_calls: Cell::new(0), find_calls: Cell::new(0) }
    }
}

impl Detector for CountingDetector {
    fn compute_tfr(
        &self,
        signal: &Array2<f64>,
        freqs: &[f64],
        sfreq: f64,
    ) -> anyhow::Result<ndarray::Array3<f64>> {
        self.tfr_calls.set(self.tfr_calls.get() + 1);
        self.inner.compute_tfr(signal, freqs, sfreq)
    }

    fn find_events(
        &self,
        tfr: &ndarray::Array3<f64>,
        params: &FindEventsParams<'_>,
    ) -> anyhow::Result<EventSet> {
        self.find_calls.set(self.find_calls.get() + 1);
        self.inner.find_events(tfr, params)
    }
}

/// Copy of `set` with `f` applied to every event.
#[allow(unused)]
pub fn map_events(set: &EventSet, f: impl Fn(usize, usize, &mut Event)) -> EventSet {
    let trials = set
        .trials()
        .iter()
        .enumerate()
        .map(|(i, t)| {
            t.iter()
                .enumerate()
                .map(|(k, ev)| {
                    let mut ev = *ev;
                    f(i, k, &mut ev);
                    ev
                })
                .collect()
        })
        .collect();
    EventSet::from_trials(trials)
}
