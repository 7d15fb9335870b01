use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use menubot_core::StopToken;
use menubot_menu::MenuCatalog;
use menubot_telegram::{
    BotIdentity, ChatPlatform, InboundEvent, InboundUpdate, MessageView, PlatformError,
};
use tokio::time::Instant;

use crate::{
    LivenessProberConfig, RestartSupervisor, SessionFactory, SupervisorConfig, SupervisorPhase,
};

type FetchStep = Result<Vec<InboundUpdate>, PlatformError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum OutboundCall {
    Send { chat_id: i64, view: MessageView },
    Edit { message_id: i64, view: MessageView },
    Ack { callback_id: String },
}

#[derive(Default)]
struct ScriptedPlatform {
    fetch_script: Mutex<VecDeque<FetchStep>>,
    fetch_log: Mutex<Vec<(Instant, i64)>>,
    outbound: Mutex<Vec<OutboundCall>>,
    probe_failures: bool,
    probe_calls: AtomicUsize,
    hang_when_drained: bool,
    stop_when_drained: Option<StopToken>,
    stop_at: Option<(Instant, StopToken)>,
}

impl ScriptedPlatform {
    fn with_script(steps: Vec<FetchStep>) -> Self {
        Self {
            fetch_script: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    fn stopping(mut self, stop: &StopToken) -> Self {
        self.stop_when_drained = Some(stop.clone());
        self
    }

    fn fetch_log(&self) -> Vec<(Instant, i64)> {
        self.fetch_log.lock().expect("fetch log").clone()
    }

    fn fetch_gaps(&self) -> Vec<Duration> {
        self.fetch_log()
            .windows(2)
            .map(|pair| pair[1].0.duration_since(pair[0].0))
            .collect()
    }

    fn outbound(&self) -> Vec<OutboundCall> {
        self.outbound.lock().expect("outbound").clone()
    }
}

#[async_trait]
impl ChatPlatform for ScriptedPlatform {
    async fn fetch_updates(&self, offset: i64, timeout: Duration) -> FetchStep {
        let now = Instant::now();
        self.fetch_log.lock().expect("fetch log").push((now, offset));
        if let Some(step) = self.fetch_script.lock().expect("script").pop_front() {
            return step;
        }
        if let Some((deadline, stop)) = &self.stop_at {
            if now >= *deadline {
                stop.stop();
                return Ok(Vec::new());
            }
        }
        if let Some(stop) = &self.stop_when_drained {
            stop.stop();
            return Ok(Vec::new());
        }
        if self.hang_when_drained {
            return std::future::pending().await;
        }
        tokio::time::sleep(timeout).await;
        Ok(Vec::new())
    }

    async fn send_message(&self, chat_id: i64, view: &MessageView) -> Result<(), PlatformError> {
        self.outbound
            .lock()
            .expect("outbound")
            .push(OutboundCall::Send {
                chat_id,
                view: view.clone(),
            });
        Ok(())
    }

    async fn edit_message(
        &self,
        _chat_id: i64,
        message_id: i64,
        view: &MessageView,
    ) -> Result<(), PlatformError> {
        self.outbound
            .lock()
            .expect("outbound")
            .push(OutboundCall::Edit {
                message_id,
                view: view.clone(),
            });
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), PlatformError> {
        self.outbound
            .lock()
            .expect("outbound")
            .push(OutboundCall::Ack {
                callback_id: callback_id.to_string(),
            });
        Ok(())
    }

    async fn probe(&self) -> Result<BotIdentity, PlatformError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_failures {
            return Err(PlatformError::NetworkUnavailable(
                "connection reset".to_string(),
            ));
        }
        Ok(BotIdentity {
            id: 1,
            username: Some("menu_bot".to_string()),
        })
    }
}

struct ScriptedFactory {
    sessions: Mutex<VecDeque<Result<Arc<ScriptedPlatform>, PlatformError>>>,
    connect_times: Mutex<Vec<Instant>>,
    stop: StopToken,
}

impl ScriptedFactory {
    fn new(
        sessions: Vec<Result<Arc<ScriptedPlatform>, PlatformError>>,
        stop: &StopToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            connect_times: Mutex::new(Vec::new()),
            stop: stop.clone(),
        })
    }

    fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().expect("connect times").clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn connect(&self) -> Result<Arc<dyn ChatPlatform>, PlatformError> {
        self.connect_times
            .lock()
            .expect("connect times")
            .push(Instant::now());
        match self.sessions.lock().expect("sessions").pop_front() {
            Some(Ok(platform)) => Ok(platform),
            Some(Err(error)) => Err(error),
            None => {
                self.stop.stop();
                Err(PlatformError::NetworkUnavailable(
                    "no scripted sessions left".to_string(),
                ))
            }
        }
    }
}

fn supervisor(
    config: SupervisorConfig,
    factory: Arc<ScriptedFactory>,
    stop: &StopToken,
) -> RestartSupervisor {
    RestartSupervisor::new(
        config,
        factory,
        Arc::new(MenuCatalog::builtin()),
        stop.clone(),
    )
}

fn start_update(update_id: i64) -> InboundUpdate {
    InboundUpdate {
        update_id,
        event: InboundEvent::StartCommand { chat_id: 42 },
    }
}

fn callback_update(update_id: i64, callback_id: &str, selection_id: &str) -> InboundUpdate {
    InboundUpdate {
        update_id,
        event: InboundEvent::Callback {
            callback_id: callback_id.to_string(),
            chat_id: 42,
            message_id: 7,
            selection_id: selection_id.to_string(),
        },
    }
}

fn assert_gap(actual: Duration, expected_secs: u64) {
    let expected = Duration::from_secs(expected_secs);
    assert!(
        actual >= expected && actual < expected + Duration::from_secs(1),
        "expected gap of {expected:?}, observed {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn integration_supervisor_routes_menu_flow_and_advances_offset() {
    let stop = StopToken::new();
    let platform = Arc::new(
        ScriptedPlatform::with_script(vec![
            Ok(vec![start_update(1), callback_update(2, "cb-1", "item1")]),
            Ok(vec![callback_update(3, "cb-2", "home")]),
        ])
        .stopping(&stop),
    );
    let factory = ScriptedFactory::new(vec![Ok(platform.clone())], &stop);
    let supervisor = supervisor(SupervisorConfig::default(), factory.clone(), &stop);
    let snapshots = supervisor.subscribe();

    let state = supervisor.run().await;

    let catalog = MenuCatalog::builtin();
    let home = catalog.render_home();
    assert_eq!(home.text, "Choose an item from the menu:");
    assert_eq!(home.buttons.len(), 8);
    assert_eq!(
        platform.outbound(),
        vec![
            OutboundCall::Send {
                chat_id: 42,
                view: home.clone(),
            },
            OutboundCall::Ack {
                callback_id: "cb-1".to_string(),
            },
            OutboundCall::Edit {
                message_id: 7,
                view: catalog.render_item("item1"),
            },
            OutboundCall::Ack {
                callback_id: "cb-2".to_string(),
            },
            OutboundCall::Edit {
                message_id: 7,
                view: home,
            },
        ]
    );
    let offsets = platform
        .fetch_log()
        .into_iter()
        .map(|(_, offset)| offset)
        .collect::<Vec<_>>();
    assert_eq!(offsets, vec![0, 3, 4]);
    assert_eq!(state.phase, SupervisorPhase::Stopped);
    assert_eq!(state.restart_count, 0);
    assert_eq!(factory.connect_times().len(), 1);

    let snapshot = snapshots.borrow().clone();
    assert_eq!(snapshot.state.phase, SupervisorPhase::Stopped);
    assert_eq!(snapshot.next_update_offset, 4);
    assert_eq!(snapshot.session_id, None);
}

#[tokio::test(start_paused = true)]
async fn functional_five_timeouts_enter_long_cooldown_exactly_once() {
    let stop = StopToken::new();
    let platform = Arc::new(
        ScriptedPlatform::with_script(
            (0..5).map(|_| Err(PlatformError::Timeout)).collect(),
        )
        .stopping(&stop),
    );
    let factory = ScriptedFactory::new(vec![Ok(platform.clone())], &stop);

    let state = supervisor(SupervisorConfig::default(), factory.clone(), &stop)
        .run()
        .await;

    let gaps = platform.fetch_gaps();
    assert_eq!(gaps.len(), 5);
    for gap in &gaps[..4] {
        assert_gap(*gap, 3);
    }
    assert_gap(gaps[4], 90);
    assert_eq!(state.long_cooldowns, 1);
    assert_eq!(state.consecutive_errors, 0);
    assert_eq!(state.restart_count, 0);
    assert_eq!(factory.connect_times().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn functional_rate_limit_waits_retry_after_plus_margin() {
    let stop = StopToken::new();
    let platform = Arc::new(
        ScriptedPlatform::with_script(vec![
            Err(PlatformError::Timeout),
            Err(PlatformError::RateLimited {
                retry_after_seconds: 10,
            }),
            Err(PlatformError::Timeout),
        ])
        .stopping(&stop),
    );
    let factory = ScriptedFactory::new(vec![Ok(platform.clone())], &stop);
    let config = SupervisorConfig {
        backoff: crate::BackoffPolicy {
            max_consecutive_errors: 2,
            ..crate::BackoffPolicy::default()
        },
        ..SupervisorConfig::default()
    };

    let state = supervisor(config, factory, &stop).run().await;

    let gaps = platform.fetch_gaps();
    assert_eq!(gaps.len(), 3);
    assert_gap(gaps[0], 3);
    assert_gap(gaps[1], 11);
    // The rate limit reset the streak, so the next timeout is a short retry.
    assert_gap(gaps[2], 3);
    assert_eq!(state.long_cooldowns, 0);
    assert_eq!(state.restart_count, 0);
}

#[tokio::test(start_paused = true)]
async fn integration_failed_probes_force_exactly_one_restart() {
    let stop = StopToken::new();
    let stalled = Arc::new(ScriptedPlatform {
        probe_failures: true,
        ..ScriptedPlatform::default()
    });
    let factory = ScriptedFactory::new(vec![Ok(stalled.clone())], &stop);
    let config = SupervisorConfig {
        prober: LivenessProberConfig {
            interval: Duration::from_secs(240),
            failure_threshold: 3,
        },
        ..SupervisorConfig::default()
    };

    let state = supervisor(config, factory.clone(), &stop).run().await;

    assert_eq!(stalled.probe_calls.load(Ordering::SeqCst), 3);
    assert_eq!(state.restart_count, 1);
    assert_eq!(state.consecutive_errors, 0);
    let connects = factory.connect_times();
    assert_eq!(connects.len(), 2);
    let restart_after = connects[1].duration_since(connects[0]);
    assert!(restart_after >= Duration::from_secs(720));
    assert!(restart_after <= Duration::from_secs(720 + 30));
}

#[tokio::test(start_paused = true)]
async fn functional_idle_session_with_healthy_probes_never_restarts() {
    let stop = StopToken::new();
    let idle = Arc::new(ScriptedPlatform {
        stop_at: Some((
            Instant::now() + Duration::from_secs(24 * 3_600),
            stop.clone(),
        )),
        ..ScriptedPlatform::default()
    });
    let factory = ScriptedFactory::new(vec![Ok(idle.clone())], &stop);
    let config = SupervisorConfig {
        prober: LivenessProberConfig {
            interval: Duration::from_secs(240),
            failure_threshold: 1,
        },
        ..SupervisorConfig::default()
    };

    let state = supervisor(config, factory.clone(), &stop).run().await;

    assert_eq!(state.restart_count, 0);
    assert_eq!(factory.connect_times().len(), 1);
    assert!(idle.probe_calls.load(Ordering::SeqCst) >= 350);
    assert!(idle.outbound().is_empty());
}

#[tokio::test(start_paused = true)]
async fn regression_unclassified_failure_tears_down_and_restarts() {
    let stop = StopToken::new();
    let broken = Arc::new(ScriptedPlatform::with_script(vec![Err(
        PlatformError::Unclassified("Conflict: terminated by other getUpdates request".to_string()),
    )]));
    let replacement = Arc::new(ScriptedPlatform::default().stopping(&stop));
    let factory = ScriptedFactory::new(
        vec![Ok(broken.clone()), Ok(replacement.clone())],
        &stop,
    );

    let state = supervisor(SupervisorConfig::default(), factory.clone(), &stop)
        .run()
        .await;

    assert_eq!(state.restart_count, 1);
    assert_eq!(broken.fetch_log().len(), 1);
    assert_eq!(replacement.fetch_log().len(), 1);
    let connects = factory.connect_times();
    assert_eq!(connects.len(), 2);
    assert_gap(connects[1].duration_since(connects[0]), 5);
}

#[tokio::test(start_paused = true)]
async fn functional_failed_session_start_retries_after_fixed_delay() {
    let stop = StopToken::new();
    let platform = Arc::new(ScriptedPlatform::default().stopping(&stop));
    let factory = ScriptedFactory::new(
        vec![
            Err(PlatformError::NetworkUnavailable("dns failure".to_string())),
            Ok(platform.clone()),
        ],
        &stop,
    );

    let state = supervisor(SupervisorConfig::default(), factory.clone(), &stop)
        .run()
        .await;

    let connects = factory.connect_times();
    assert_eq!(connects.len(), 2);
    assert_gap(connects[1].duration_since(connects[0]), 5);
    assert_eq!(state.restart_count, 0);
    assert_eq!(platform.fetch_log().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn functional_operator_stop_interrupts_pending_poll_and_stops_prober() {
    let stop = StopToken::new();
    let platform = Arc::new(ScriptedPlatform {
        hang_when_drained: true,
        ..ScriptedPlatform::default()
    });
    let factory = ScriptedFactory::new(vec![Ok(platform.clone())], &stop);
    let run = tokio::spawn(supervisor(SupervisorConfig::default(), factory.clone(), &stop).run());

    tokio::time::sleep(Duration::from_secs(10)).await;
    stop.stop();
    let state = run.await.expect("supervisor task");

    assert_eq!(state.phase, SupervisorPhase::Stopped);
    assert_eq!(state.restart_count, 0);
    assert_eq!(factory.connect_times().len(), 1);

    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(platform.probe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn regression_stall_interrupts_long_backoff_wait() {
    let stop = StopToken::new();
    let platform = Arc::new(ScriptedPlatform {
        fetch_script: Mutex::new(vec![Err(PlatformError::Timeout)].into()),
        probe_failures: true,
        ..ScriptedPlatform::default()
    });
    let factory = ScriptedFactory::new(vec![Ok(platform.clone())], &stop);
    let config = SupervisorConfig {
        backoff: crate::BackoffPolicy {
            timeout_retry_delay: Duration::from_secs(3_600),
            ..crate::BackoffPolicy::default()
        },
        prober: LivenessProberConfig {
            interval: Duration::from_secs(60),
            failure_threshold: 1,
        },
        ..SupervisorConfig::default()
    };

    let state = supervisor(config, factory.clone(), &stop).run().await;

    assert_eq!(state.restart_count, 1);
    assert_eq!(platform.fetch_log().len(), 1);
    let connects = factory.connect_times();
    assert_eq!(connects.len(), 2);
    assert_gap(connects[1].duration_since(connects[0]), 60);
}
