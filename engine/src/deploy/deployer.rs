//! Resilient deployer: probe, translate, push, retry, fall back to the queue

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::{future, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::merge::effective_config;
use crate::config::translate::Translator;
use crate::deploy::fsm::{AttemptEvent, AttemptFsm, RetryPolicy};
use crate::deploy::queue::QueueOptions;
use crate::errors::EngineError;
use crate::health::prober::{HealthProber, HealthResult};
use crate::http::client::{RemoteResponse, Transport};
use crate::http::moderation::{ModerationClient, Timeouts};
use crate::models::deployment::{DeploymentRecord, DeploymentType, StepResult};
use crate::models::history::{HistoryEntry, HistoryStatus};
use crate::models::queue::{QueueEntry, QueueStatus};
use crate::models::server::ModerationServer;
use crate::models::site::{Detector, EffectiveConfig, SiteConfiguration, SiteDeploymentStatus};
use crate::storage::store::Store;
use crate::utils::{generate_uuid, json_digest};

/// Status code the keyword endpoint uses for "write not implemented"
pub const BLIP_WRITE_UNSUPPORTED_STATUS: u16 = 422;

pub const BLIP_WRITE_UNSUPPORTED_NOTE: &str =
    "keyword detector endpoint does not implement config writes (422); treated as no-op";

/// A deployment request for one site
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Correlates logs, the outcome and background runs
    pub run_id: String,
    pub site_id: u64,
    pub deployment_type: DeploymentType,
    /// Deploy even when the health probe reports the target offline
    pub force_retry: bool,
    /// Call `/restart` after the config writes
    pub restart: bool,
    /// Priority for the queue entry if the deployment gets queued
    pub priority: i32,
    /// Overrides the policy's attempt count
    pub max_attempts: Option<u32>,
}

impl DeployRequest {
    pub fn new(site_id: u64) -> Self {
        Self {
            run_id: generate_uuid(),
            site_id,
            deployment_type: DeploymentType::Full,
            force_retry: false,
            restart: false,
            priority: 0,
            max_attempts: None,
        }
    }

    pub fn with_type(mut self, deployment_type: DeploymentType) -> Self {
        self.deployment_type = deployment_type;
        self
    }

    pub fn force_retry(mut self, force: bool) -> Self {
        self.force_retry = force;
        self
    }

    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// Terminal result of a resilient deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub run_id: String,
    pub site_id: u64,
    pub server_id: u64,
    pub success: bool,
    /// Handed to the deployment queue
    pub queued: bool,
    /// Deployment attempts actually sent
    pub attempts: u32,
    #[serde(default)]
    pub deployment_id: Option<u64>,
    #[serde(default)]
    pub history_id: Option<u64>,
    #[serde(default)]
    pub queue_entry_id: Option<u64>,
    #[serde(default)]
    pub config_version: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub elapsed_ms: u64,
}

/// Result of a single attempt
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub record: DeploymentRecord,
    pub success: bool,
    /// A failed step could not reach the server
    pub unreachable: bool,
    pub notes: Vec<String>,
}

impl AttemptReport {
    pub fn error(&self) -> Option<&str> {
        self.record.error_message.as_deref()
    }
}

/// What a successful attempt wrote locally
#[derive(Debug, Clone, Default)]
pub struct Applied {
    pub history_id: Option<u64>,
    pub config_version: Option<u64>,
}

/// Site, its target server and the config to push
#[derive(Debug, Clone)]
pub struct DeployTarget {
    pub site: SiteConfiguration,
    pub server: ModerationServer,
    pub config: EffectiveConfig,
}

/// Deployer options
#[derive(Debug, Clone, Default)]
pub struct DeployerOptions {
    pub policy: RetryPolicy,
    pub timeouts: Timeouts,
    pub queue: QueueOptions,
}

/// Orchestrates prober, translator and transport with bounded retries
pub struct ResilientDeployer {
    transport: Arc<dyn Transport>,
    prober: Arc<HealthProber>,
    store: Arc<dyn Store>,
    translator: Translator,
    options: DeployerOptions,
}

impl ResilientDeployer {
    pub fn new(
        transport: Arc<dyn Transport>,
        prober: Arc<HealthProber>,
        store: Arc<dyn Store>,
        translator: Translator,
        options: DeployerOptions,
    ) -> Self {
        Self {
            transport,
            prober,
            store,
            translator,
            options,
        }
    }

    pub fn options(&self) -> &DeployerOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Load and validate a site's deployment target. No remote I/O.
    pub async fn load_target(&self, site_id: u64) -> Result<DeployTarget, EngineError> {
        load_target(self.store.as_ref(), site_id).await
    }

    /// Detector families to push, restricted to what the server supports
    pub fn detectors_for(
        server: &ModerationServer,
        deployment_type: DeploymentType,
    ) -> Result<Vec<Detector>, EngineError> {
        let detectors: Vec<Detector> = deployment_type
            .detectors()
            .iter()
            .copied()
            .filter(|d| match d {
                Detector::Nudenet => server.supports_nudenet,
                Detector::Blip => server.supports_blip,
            })
            .collect();

        if detectors.is_empty() {
            return Err(EngineError::ValidationError(format!(
                "server {} supports none of the detectors in a {:?} deployment",
                server.id, deployment_type
            )));
        }
        Ok(detectors)
    }

    /// Deploy without cancellation
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome, EngineError> {
        self.deploy_with_cancel(request, future::pending::<()>()).await
    }

    /// Deploy with bounded retries.
    ///
    /// The deadline from the retry policy and `cancel` both bound the whole
    /// run: probes, in-flight attempts and backoff sleeps. An attempt cut
    /// short is recorded as failed before the error is returned.
    pub async fn deploy_with_cancel<C>(&self, request: DeployRequest, cancel: C) -> Result<DeployOutcome, EngineError>
    where
        C: Future<Output = ()> + Send,
    {
        let started = Instant::now();
        let target = self.load_target(request.site_id).await?;
        let detectors = Self::detectors_for(&target.server, request.deployment_type)?;

        let policy = &self.options.policy;
        let max_attempts = request.max_attempts.unwrap_or(policy.max_attempts).max(1);
        let deadline = policy.deadline.map(|d| (d, started + d));

        let mut outcome = DeployOutcome {
            run_id: request.run_id.clone(),
            site_id: target.site.id,
            server_id: target.server.id,
            success: false,
            queued: false,
            attempts: 0,
            deployment_id: None,
            history_id: None,
            queue_entry_id: None,
            config_version: None,
            error: None,
            notes: Vec::new(),
            elapsed_ms: 0,
        };

        info!(
            "Deploying site {} to server {} ({:?}, run {})",
            target.site.id,
            target.server.base_url(),
            request.deployment_type,
            outcome.run_id
        );

        tokio::pin!(cancel);
        let deadline_at = deadline.map(|(_, at)| at);
        let interrupted = |interrupt: Interrupt, attempts: u32| match interrupt {
            Interrupt::Deadline => EngineError::DeadlineExceeded {
                deadline: deadline.map(|(limit, _)| limit).unwrap_or_default(),
                attempts,
            },
            Interrupt::Cancelled => EngineError::Cancelled { attempts },
        };
        self.set_site_status(target.site.id, SiteDeploymentStatus::InProgress).await;

        let mut last_unreachable = false;

        while outcome.attempts < max_attempts {
            let pending = if deadline_at.is_some_and(|at| Instant::now() >= at) {
                Some(Interrupt::Deadline)
            } else if (&mut cancel).now_or_never().is_some() {
                Some(Interrupt::Cancelled)
            } else {
                None
            };
            if let Some(interrupt) = pending {
                warn!("Deployment run {} stopped: {}", outcome.run_id, interrupt.reason());
                self.set_site_status(target.site.id, SiteDeploymentStatus::Failed).await;
                return Err(interrupted(interrupt, outcome.attempts));
            }

            let health = match bounded(self.probe(&target.server), deadline_at, cancel.as_mut()).await {
                Ok(health) => health,
                Err(interrupt) => {
                    warn!("Deployment run {} stopped while probing: {}", outcome.run_id, interrupt.reason());
                    self.set_site_status(target.site.id, SiteDeploymentStatus::Failed).await;
                    return Err(interrupted(interrupt, outcome.attempts));
                }
            };
            if health.is_offline() && !request.force_retry {
                info!(
                    "Server {} offline; queueing site {} instead of attempting",
                    target.server.id, target.site.id
                );
                let reason = health.error.clone().unwrap_or_else(|| "server offline".to_string());
                outcome.queue_entry_id = self
                    .enqueue(&target, request.deployment_type, request.priority, &reason)
                    .await;
                outcome.queued = true;
                outcome.error = Some(reason);
                outcome.elapsed_ms = started.elapsed().as_millis() as u64;
                self.set_site_status(target.site.id, SiteDeploymentStatus::Pending).await;
                return Ok(outcome);
            }

            outcome.attempts += 1;
            let mut attempt = self
                .begin_attempt(&target, request.deployment_type, outcome.attempts)
                .await;
            outcome.deployment_id = Some(attempt.record.id);

            let pushed = bounded(
                self.push(&target, &detectors, request.restart, &mut attempt.record),
                deadline_at,
                cancel.as_mut(),
            )
            .await;
            let report = match pushed {
                Ok(pushed) => self.finish_attempt(attempt, pushed).await,
                Err(interrupt) => {
                    warn!(
                        "Deployment run {} stopped during attempt {}: {}",
                        outcome.run_id,
                        outcome.attempts,
                        interrupt.reason()
                    );
                    self.abort_attempt(attempt, interrupt.reason()).await;
                    self.set_site_status(target.site.id, SiteDeploymentStatus::Failed).await;
                    return Err(interrupted(interrupt, outcome.attempts));
                }
            };
            outcome.notes.extend(report.notes.iter().cloned());

            if report.success {
                let applied = self.apply_success(&target, request.deployment_type, None).await;
                outcome.success = true;
                outcome.error = None;
                outcome.history_id = applied.history_id;
                outcome.config_version = applied.config_version;
                outcome.elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Site {} deployed on attempt {}/{} in {}ms",
                    target.site.id, outcome.attempts, max_attempts, outcome.elapsed_ms
                );
                return Ok(outcome);
            }

            outcome.error = report.error().map(str::to_string);
            last_unreachable = report.unreachable || health.is_offline();
            warn!(
                "Attempt {}/{} for site {} failed: {}",
                outcome.attempts,
                max_attempts,
                target.site.id,
                outcome.error.as_deref().unwrap_or("unknown error")
            );

            if outcome.attempts < max_attempts {
                let mut delay = policy.backoff(outcome.attempts);
                if let Some((_, at)) = deadline {
                    delay = delay.min(at.saturating_duration_since(Instant::now()));
                }
                debug!("Backing off {:?} before attempt {}", delay, outcome.attempts + 1);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut cancel => {
                        info!("Deployment run {} cancelled during backoff", outcome.run_id);
                        self.set_site_status(target.site.id, SiteDeploymentStatus::Failed).await;
                        return Err(interrupted(Interrupt::Cancelled, outcome.attempts));
                    }
                }
            }
        }

        self.set_site_status(target.site.id, SiteDeploymentStatus::Failed).await;
        error!(
            "Site {} deployment failed after {} attempt(s): {}",
            target.site.id,
            outcome.attempts,
            outcome.error.as_deref().unwrap_or("unknown error")
        );

        if last_unreachable {
            let reason = outcome.error.clone().unwrap_or_else(|| "server unavailable".to_string());
            outcome.queue_entry_id = self
                .enqueue(&target, request.deployment_type, request.priority, &reason)
                .await;
            outcome.queued = outcome.queue_entry_id.is_some();
        }

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }

    /// Run a deployment in the background
    pub fn spawn_deploy(self: &Arc<Self>, request: DeployRequest) -> JoinHandle<Result<DeployOutcome, EngineError>> {
        let deployer = self.clone();
        tokio::spawn(async move { deployer.deploy(request).await })
    }

    /// Probe and record the server's status
    pub async fn probe(&self, server: &ModerationServer) -> HealthResult {
        let health = self.prober.probe(server).await;
        if let Err(e) = self
            .store
            .update_server_status(server.id, health.status.into(), health.checked_at)
            .await
        {
            error!("Failed to record status for server {}: {}", server.id, e);
        }
        health
    }

    /// One attempt: translate and push each detector, optionally restart.
    ///
    /// Every attempt ends in a terminal deployment record.
    pub async fn deploy_once(
        &self,
        target: &DeployTarget,
        deployment_type: DeploymentType,
        detectors: &[Detector],
        restart: bool,
        attempt: u32,
    ) -> AttemptReport {
        let mut attempt = self.begin_attempt(target, deployment_type, attempt).await;
        let pushed = self.push(target, detectors, restart, &mut attempt.record).await;
        self.finish_attempt(attempt, pushed).await
    }

    async fn begin_attempt(&self, target: &DeployTarget, deployment_type: DeploymentType, attempt: u32) -> Attempt {
        let mut record = DeploymentRecord::new(
            target.site.id,
            target.server.id,
            deployment_type,
            attempt,
            target.config.clone(),
        );
        let mut fsm = AttemptFsm::new();

        match self.store.insert_deployment(record.clone()).await {
            Ok(id) => record.id = id,
            Err(e) => error!("Failed to record deployment attempt for site {}: {}", target.site.id, e),
        }

        advance(&mut fsm, &mut record, AttemptEvent::Start);
        self.save_record(&record).await;

        Attempt {
            record,
            fsm,
            started: Instant::now(),
        }
    }

    /// Remote half of an attempt; steps land on `record` as they complete
    async fn push(
        &self,
        target: &DeployTarget,
        detectors: &[Detector],
        restart: bool,
        record: &mut DeploymentRecord,
    ) -> Pushed {
        let client = ModerationClient::new(self.transport.as_ref(), &target.server, &self.options.timeouts);
        let mut pushed = Pushed::default();

        for detector in detectors {
            let block = target.config.block(*detector);
            let response = match detector {
                Detector::Nudenet => client.write_nudenet(&self.translator.nudenet(block)).await,
                Detector::Blip => client.write_blip(&self.translator.blip(block)).await,
            };

            let mut step = step_result(detector.as_str(), &response);
            if *detector == Detector::Blip && response.status == BLIP_WRITE_UNSUPPORTED_STATUS {
                step.ok = true;
                step.note = Some(BLIP_WRITE_UNSUPPORTED_NOTE.to_string());
                record.blip_write_unsupported = true;
                pushed.notes.push(BLIP_WRITE_UNSUPPORTED_NOTE.to_string());
                warn!("Server {}: {}", target.server.id, BLIP_WRITE_UNSUPPORTED_NOTE);
            }

            if !step.ok {
                pushed.unreachable |= response.is_unreachable();
                pushed.failures.push(format!("{}: {}", detector, response.describe()));
            }
            record.steps.push(step);
        }

        if restart && pushed.failures.is_empty() {
            let response = client.restart().await;
            let step = step_result("restart", &response);
            if !step.ok {
                pushed.unreachable |= response.is_unreachable();
                pushed.failures.push(format!("restart: {}", response.describe()));
            }
            record.steps.push(step);
        }

        pushed
    }

    async fn finish_attempt(&self, attempt: Attempt, pushed: Pushed) -> AttemptReport {
        let Attempt {
            mut record,
            mut fsm,
            started,
        } = attempt;

        let success = pushed.failures.is_empty();
        let event = if success {
            AttemptEvent::Succeed
        } else {
            AttemptEvent::Fail(pushed.failures.join("; "))
        };
        advance(&mut fsm, &mut record, event);
        record.finished_at = Some(Utc::now());
        record.duration_ms = Some(started.elapsed().as_millis() as u64);
        self.save_record(&record).await;

        AttemptReport {
            record,
            success,
            unreachable: pushed.unreachable,
            notes: pushed.notes,
        }
    }

    /// Close an attempt whose push was cut short
    async fn abort_attempt(&self, attempt: Attempt, reason: &str) {
        let Attempt {
            mut record,
            mut fsm,
            started,
        } = attempt;

        advance(&mut fsm, &mut record, AttemptEvent::Fail(reason.to_string()));
        record.finished_at = Some(Utc::now());
        record.duration_ms = Some(started.elapsed().as_millis() as u64);
        self.save_record(&record).await;
    }

    /// Record a successful push: site row first, then the history snapshot
    pub async fn apply_success(
        &self,
        target: &DeployTarget,
        deployment_type: DeploymentType,
        restored_from: Option<u64>,
    ) -> Applied {
        let now = Utc::now();
        let mut applied = Applied::default();

        match self.store.record_site_deployed(target.site.id, now).await {
            Ok(version) => applied.config_version = Some(version),
            Err(e) => error!("Failed to mark site {} deployed: {}", target.site.id, e),
        }

        let entry = HistoryEntry {
            id: 0,
            site_id: target.site.id,
            server_id: target.server.id,
            deployment_type,
            status: HistoryStatus::Success,
            config: target.config.clone(),
            config_digest: json_digest(&target.config),
            config_version: applied.config_version.unwrap_or(target.site.config_version),
            created_at: now,
            rolled_back_at: None,
            restored_from,
        };
        match self.store.insert_history(entry).await {
            Ok(id) => applied.history_id = Some(id),
            Err(e) => error!("Failed to write history for site {}: {}", target.site.id, e),
        }

        applied
    }

    /// Queue a deployment for a later sweep
    pub async fn enqueue(
        &self,
        target: &DeployTarget,
        deployment_type: DeploymentType,
        priority: i32,
        reason: &str,
    ) -> Option<u64> {
        let now = Utc::now();
        let queue = &self.options.queue;
        let entry = QueueEntry {
            id: 0,
            site_id: target.site.id,
            server_id: target.server.id,
            deployment_type,
            config_snapshot: target.config.clone(),
            priority,
            retry_count: 0,
            max_retries: queue.default_max_retries,
            next_retry_at: now + chrono_duration(queue.initial_delay),
            status: QueueStatus::Pending,
            created_at: now,
            last_error: Some(reason.to_string()),
            completed_at: None,
            claim_expires_at: None,
        };

        match self.store.enqueue(entry).await {
            Ok(id) => {
                info!("Queued deployment {} for site {}", id, target.site.id);
                Some(id)
            }
            Err(e) => {
                error!("Failed to queue deployment for site {}: {}", target.site.id, e);
                None
            }
        }
    }

    async fn set_site_status(&self, site_id: u64, status: SiteDeploymentStatus) {
        if let Err(e) = self.store.set_site_status(site_id, status).await {
            error!("Failed to set site {} status to {:?}: {}", site_id, status, e);
        }
    }

    async fn save_record(&self, record: &DeploymentRecord) {
        if record.id == 0 {
            return;
        }
        if let Err(e) = self.store.update_deployment(record).await {
            error!("Failed to update deployment {}: {}", record.id, e);
        }
    }
}

/// Why a deployment stopped before its attempts ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Deadline,
    Cancelled,
}

impl Interrupt {
    fn reason(&self) -> &'static str {
        match self {
            Interrupt::Deadline => "deadline exceeded",
            Interrupt::Cancelled => "cancelled",
        }
    }
}

/// An attempt whose record has been opened
struct Attempt {
    record: DeploymentRecord,
    fsm: AttemptFsm,
    started: Instant,
}

#[derive(Debug, Default)]
struct Pushed {
    notes: Vec<String>,
    failures: Vec<String>,
    unreachable: bool,
}

/// Drive `work` until it finishes, the deadline passes or `cancel` resolves
async fn bounded<F, C>(work: F, deadline_at: Option<Instant>, cancel: Pin<&mut C>) -> Result<F::Output, Interrupt>
where
    F: Future,
    C: Future<Output = ()>,
{
    let expiry = async {
        match deadline_at {
            Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
            None => future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel => Err(Interrupt::Cancelled),
        _ = expiry => Err(Interrupt::Deadline),
        output = work => Ok(output),
    }
}

/// Site, server and merged config for `site_id`
pub async fn load_target(store: &dyn Store, site_id: u64) -> Result<DeployTarget, EngineError> {
    let site = store
        .get_site(site_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("site {}", site_id)))?;

    let server = store.get_server(site.server_id).await?.ok_or_else(|| {
        EngineError::ValidationError(format!(
            "site {} references unknown server {}",
            site_id, site.server_id
        ))
    })?;

    let template = match site.template_id {
        Some(template_id) => Some(store.get_template(template_id).await?.ok_or_else(|| {
            EngineError::ValidationError(format!(
                "site {} references unknown template {}",
                site_id, template_id
            ))
        })?),
        None => None,
    };

    let config = effective_config(template.as_ref(), &site);
    Ok(DeployTarget { site, server, config })
}

fn advance(fsm: &mut AttemptFsm, record: &mut DeploymentRecord, event: AttemptEvent) {
    match fsm.process(event) {
        Ok(state) => {
            record.status = state;
            record.error_message = fsm.error().map(str::to_string);
        }
        Err(e) => error!("Deployment {}: {}", record.id, e),
    }
}

fn step_result(step: &str, response: &RemoteResponse) -> StepResult {
    StepResult {
        step: step.to_string(),
        ok: response.ok,
        status: response.status,
        response: response.body.clone(),
        note: None,
    }
}

pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
