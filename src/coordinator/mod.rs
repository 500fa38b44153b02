//! EM Run Coordinator (C8): the stage machine, single-writer discipline, and cache
//! invalidation around one genetic-optimization run, per `spec.md` §4.8 and §5.
//!
//! Mirrors the reference implementation's singleton `EnergyManagement` instance, but threaded
//! through a constructor instead of held as process-wide global state (`spec.md` §9 Design
//! Notes: "Global singletons ... should be context values, not global mutable state").
pub mod cache;

use crate::assembler::{AdapterPort, DeviceInventory, MeasurementProvider, ParameterAssembler, PredictionProvider};
use crate::config::{EmsMode, EngineConfig};
use crate::domain::plan::EnergyManagementPlan;
use crate::domain::types::Horizon;
use crate::error::{EosError, WorkerError};
use crate::fitness::FitnessEvaluator;
use crate::genetic::GeneticEngine;
use crate::materializer::{OptimizationSolution, SolutionMaterializer};
use crate::simulator;
use cache::RunCache;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Coordinator stage, advancing strictly in run order. Observers reading [`EmRunCoordinator::stage`]
/// see monotonic progress within one run (`spec.md` §5 "Ordering").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyManagementStage {
    Idle,
    DataAcquisition,
    ForecastRetrieval,
    Optimization,
    ControlDispatch,
}

/// The best genome found by the most recent successful run, as the dense integer vector the
/// genetic engine operates on — opaque to callers outside this crate's codec.
pub type DenseGenome = Vec<i64>;

/// Singleton-shaped run coordinator. Owns no device state itself; each run's devices,
/// forecasts, and population are assembled fresh and live only for that run's duration
/// (`spec.md` §3.7 "Lifecycle & ownership").
pub struct EmRunCoordinator {
    config: EngineConfig,
    tz: Tz,
    predictions: Arc<dyn PredictionProvider>,
    measurements: Arc<dyn MeasurementProvider>,
    adapter: Arc<dyn AdapterPort>,

    stage: RwLock<EnergyManagementStage>,
    run_lock: Mutex<()>,
    cache: Mutex<RunCache>,
    last_run: Mutex<Option<DateTime<Utc>>>,

    best_genome: RwLock<Option<DenseGenome>>,
    solution: RwLock<Option<OptimizationSolution>>,
    plan: RwLock<Option<EnergyManagementPlan>>,
}

impl EmRunCoordinator {
    pub fn new(
        config: EngineConfig,
        tz: Tz,
        predictions: Arc<dyn PredictionProvider>,
        measurements: Arc<dyn MeasurementProvider>,
        adapter: Arc<dyn AdapterPort>,
    ) -> Self {
        Self {
            config,
            tz,
            predictions,
            measurements,
            adapter,
            stage: RwLock::new(EnergyManagementStage::Idle),
            run_lock: Mutex::new(()),
            cache: Mutex::new(RunCache::default()),
            last_run: Mutex::new(None),
            best_genome: RwLock::new(None),
            solution: RwLock::new(None),
            plan: RwLock::new(None),
        }
    }

    pub async fn stage(&self) -> EnergyManagementStage {
        *self.stage.read().await
    }

    /// Result surface (`spec.md` §6.4): the best genome + metadata from the most recently
    /// completed run, for diagnostics/UI.
    pub async fn genetic_solution(&self) -> Option<DenseGenome> {
        self.best_genome.read().await.clone()
    }

    pub async fn optimization_solution(&self) -> Option<OptimizationSolution> {
        self.solution.read().await.clone()
    }

    pub async fn plan(&self) -> Option<EnergyManagementPlan> {
        self.plan.read().await.clone()
    }

    /// Run one optimization cycle now. Equivalent to `run_at(Utc::now(), inventory)`.
    pub async fn run(&self, inventory: DeviceInventory) -> Result<(), EosError> {
        self.run_at(Utc::now(), inventory).await
    }

    /// Run one optimization cycle anchored at `run_start` (exposed separately from [`Self::run`]
    /// so tests get deterministic horizons without mocking the clock).
    ///
    /// Stages advance strictly `Idle -> DataAcquisition -> ForecastRetrieval ->
    /// (Optimization -> ControlDispatch)? -> Idle`; the coordinator always returns to `Idle`
    /// before releasing the run lock, even on failure (`spec.md` §4.8, §5).
    pub async fn run_at(&self, run_start: DateTime<Utc>, inventory: DeviceInventory) -> Result<(), EosError> {
        let _guard = self.run_lock.lock().await;
        let result = self.run_locked(run_start, inventory).await;
        *self.stage.write().await = EnergyManagementStage::Idle;
        result
    }

    /// Periodic coordinator suitable for a heartbeat poll (`spec.md` §4.8 `manage_energy`).
    /// Runs unconditionally on the first call, afterwards only once `now - last_run >=
    /// ems.interval`. Callers who observe a run already in progress are skipped rather than
    /// queued, matching the "do not pile up" contract of `spec.md` §5. Returns whether a run
    /// was actually performed.
    pub async fn manage_energy(&self, now: DateTime<Utc>, inventory: DeviceInventory) -> Result<bool, EosError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return Ok(false);
        };

        let interval = ChronoDuration::seconds(self.config.ems.interval_s as i64);
        let due = {
            let last_run = self.last_run.lock().await;
            match *last_run {
                None => true,
                Some(last) => now - last >= interval,
            }
        };
        if !due {
            return Ok(false);
        }

        let result = self.run_locked(now, inventory).await;
        *self.stage.write().await = EnergyManagementStage::Idle;

        if result.is_ok() {
            let mut last_run = self.last_run.lock().await;
            *last_run = Some(match *last_run {
                // Catch up by whole intervals so a long stall doesn't burst subsequent ticks.
                Some(last) if interval > ChronoDuration::zero() => {
                    let elapsed = now - last;
                    let whole_intervals = elapsed.num_seconds() / interval.num_seconds().max(1);
                    last + ChronoDuration::seconds(whole_intervals * interval.num_seconds().max(1))
                }
                _ => now,
            });
        }
        result.map(|_| true)
    }

    async fn run_locked(&self, run_start: DateTime<Utc>, inventory: DeviceInventory) -> Result<(), EosError> {
        *self.stage.write().await = EnergyManagementStage::DataAcquisition;
        self.adapter.update_data(false).await;

        *self.stage.write().await = EnergyManagementStage::ForecastRetrieval;
        if self.config.ems.mode == EmsMode::Prediction {
            info!("prediction-only mode: skipping optimization this cycle");
            return Ok(());
        }

        let mut cache = self.cache.lock().await;
        cache.clear();

        let horizon = Horizon::new(run_start, self.tz, self.config.prediction.hours);
        let assembler = ParameterAssembler::new(self.predictions.as_ref(), self.measurements.as_ref());
        let params = assembler.assemble(&self.config, horizon, inventory, &mut cache)?;
        drop(cache);

        *self.stage.write().await = EnergyManagementStage::Optimization;

        let seed_solution = self.best_genome.read().await.clone();
        let evaluator = FitnessEvaluator {
            layout: params.layout,
            devices: params.devices.clone(),
            forecast: params.forecast.clone(),
            horizon: params.horizon,
            optimize_dc_charge: params.optimize_dc_charge,
            optimize_ev: params.optimize_ev,
            ev_shortfall_penalty_per_pct: params.ev_shortfall_penalty_per_pct,
        };
        let engine = GeneticEngine {
            layout: params.layout,
            evaluator,
            generations: params.generations,
            seed: params.seed,
            population_size: params.population_size,
        };

        let worker_result = tokio::task::spawn_blocking(move || engine.run(seed_solution.as_deref()))
            .await
            .map_err(|join_err| WorkerError::JoinFailed(join_err.to_string()))?;

        let genome = params.layout.decode(&worker_result.best_dense);
        let output = simulator::simulate(
            &params.devices,
            &params.forecast,
            &genome,
            &params.horizon,
            params.optimize_dc_charge,
        )
        .map_err(|e| {
            error!(error = %e, "best genome failed to re-simulate during materialization");
            WorkerError::JoinFailed(e.to_string())
        })?;

        let (solution, plan) = SolutionMaterializer::materialize(
            &genome,
            &output,
            &params.forecast,
            &params.horizon,
            &params.devices,
        );

        *self.best_genome.write().await = Some(worker_result.best_dense);
        *self.solution.write().await = Some(solution);
        *self.plan.write().await = Some(plan);

        *self.stage.write().await = EnergyManagementStage::ControlDispatch;
        self.adapter.update_data(true).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{FillMethod, ForecastError};
    use crate::config::EngineConfig;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlatPredictions;
    impl PredictionProvider for FlatPredictions {
        fn key_to_array(
            &self,
            key: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            _interval: ChronoDuration,
            _fill: FillMethod,
        ) -> Result<Vec<f64>, ForecastError> {
            let hours = (end - start).num_hours().max(0) as usize;
            let value = if key == "pvforecast_ac_power" { 0.0 } else { 1.0 };
            Ok(vec![value; hours])
        }
    }

    struct NoMeasurements;
    impl MeasurementProvider for NoMeasurements {
        fn key_to_value(&self, _key: &str, _at: DateTime<Utc>) -> Option<f64> {
            None
        }
    }

    struct CountingAdapter {
        calls: AtomicUsize,
    }
    #[async_trait]
    impl AdapterPort for CountingAdapter {
        async fn update_data(&self, _force_enable: bool) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator() -> EmRunCoordinator {
        let mut config = EngineConfig::default();
        config.optimization.genetic.generations = 1;
        config.optimization.genetic.individuals = 20;
        config.optimization.genetic.seed = Some(7);
        config.devices.max_batteries = 0;
        EmRunCoordinator::new(
            config,
            chrono_tz::Europe::Berlin,
            Arc::new(FlatPredictions),
            Arc::new(NoMeasurements),
            Arc::new(CountingAdapter { calls: AtomicUsize::new(0) }),
        )
    }

    #[tokio::test]
    async fn run_returns_to_idle_stage_on_success() {
        let coordinator = coordinator();
        let run_start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        coordinator
            .run_at(run_start, DeviceInventory::default())
            .await
            .unwrap();
        assert_eq!(coordinator.stage().await, EnergyManagementStage::Idle);
        assert!(coordinator.genetic_solution().await.is_some());
        assert!(coordinator.plan().await.is_some());
    }

    #[tokio::test]
    async fn prediction_mode_skips_optimization_and_publishes_nothing() {
        let mut config = EngineConfig::default();
        config.ems.mode = EmsMode::Prediction;
        let coordinator = EmRunCoordinator::new(
            config,
            chrono_tz::Europe::Berlin,
            Arc::new(FlatPredictions),
            Arc::new(NoMeasurements),
            Arc::new(CountingAdapter { calls: AtomicUsize::new(0) }),
        );
        let run_start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        coordinator
            .run_at(run_start, DeviceInventory::default())
            .await
            .unwrap();
        assert_eq!(coordinator.stage().await, EnergyManagementStage::Idle);
        assert!(coordinator.plan().await.is_none());
    }

    #[tokio::test]
    async fn manage_energy_runs_unconditionally_on_first_call() {
        let coordinator = coordinator();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let ran = coordinator
            .manage_energy(now, DeviceInventory::default())
            .await
            .unwrap();
        assert!(ran);
    }

    #[tokio::test]
    async fn manage_energy_skips_before_interval_elapses() {
        let coordinator = coordinator();
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        coordinator.manage_energy(t0, DeviceInventory::default()).await.unwrap();

        let soon_after = t0 + ChronoDuration::seconds(1);
        let ran_again = coordinator
            .manage_energy(soon_after, DeviceInventory::default())
            .await
            .unwrap();
        assert!(!ran_again);
    }
}
