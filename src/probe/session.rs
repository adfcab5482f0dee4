use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::dispatcher::{CommandDispatcher, DispatchReceipt};
use super::notification_log::{NotificationLogger, NotificationRecord};
use super::presets::{OperatorAction, PresetTable};
use crate::error::{DispatchError, InteractionError, discard_shutdown_error};
use crate::hw::{
    CharacteristicInfo, CharacteristicSelection, DeviceSession, NotificationStream,
    SelectionPolicy, select_characteristics,
};

/// Operator key presses, already decoded to characters.
pub type OperatorKeys = Pin<Box<dyn Stream<Item = Result<char, InteractionError>>>>;

/// Why a probing session ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum StopReason {
    /// The operator pressed the quit key.
    #[display("quit key")]
    QuitKey,
    /// Operator input reached end of stream.
    #[display("input closed")]
    InputClosed,
    /// The `send` listen window ran out.
    #[display("listen window elapsed")]
    ListenWindowElapsed,
    /// Ctrl+C arrived as a signal rather than as a key press.
    #[display("interrupted")]
    Interrupted,
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionSummary {
    commands_sent: usize,
    commands_failed: usize,
    notifications_logged: usize,
    stop_reason: StopReason,
}

impl SessionSummary {
    /// Returns how many commands were delivered.
    #[must_use]
    pub fn commands_sent(&self) -> usize {
        self.commands_sent
    }

    /// Returns how many commands no candidate accepted.
    #[must_use]
    pub fn commands_failed(&self) -> usize {
        self.commands_failed
    }

    /// Returns how many notifications were logged.
    #[must_use]
    pub fn notifications_logged(&self) -> usize {
        self.notifications_logged
    }

    /// Returns why the session ended.
    #[must_use]
    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }
}

/// Something worth showing the operator while a session runs.
#[derive(Debug)]
pub enum ProbeEvent<'a> {
    /// Notifications were enabled on a target.
    Subscribed(&'a CharacteristicInfo),
    /// A target refused the subscription; the session continues without it.
    SubscribeFailed {
        characteristic: &'a CharacteristicInfo,
        error: &'a InteractionError,
    },
    /// A command frame was accepted by a write candidate.
    CommandSent {
        label: Option<&'a str>,
        receipt: &'a DispatchReceipt,
    },
    /// No write candidate accepted a command.
    CommandFailed {
        label: Option<&'a str>,
        error: &'a DispatchError,
    },
    /// An inbound notification was numbered.
    Notification(&'a NotificationRecord),
    /// The operator asked for the preset table.
    PresetList(&'a PresetTable),
    /// The operator pressed a key with no binding.
    UnboundKey(char),
}

/// Connected device plus its selected characteristics, ready to take commands.
///
/// The session exclusively owns the connection and the notification counter.
pub struct ProbeSession {
    device: DeviceSession,
    selection: CharacteristicSelection,
    subscribed: Vec<CharacteristicInfo>,
    notifications: NotificationStream,
    logger: NotificationLogger,
    commands_sent: usize,
    commands_failed: usize,
}

impl fmt::Debug for ProbeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeSession")
            .field("device", &self.device)
            .field("selection", &self.selection)
            .field("subscribed", &self.subscribed)
            .field("logger", &self.logger)
            .field("commands_sent", &self.commands_sent)
            .field("commands_failed", &self.commands_failed)
            .finish_non_exhaustive()
    }
}

impl ProbeSession {
    /// Selects characteristics, opens the notification stream and subscribes
    /// to every notify target.
    ///
    /// Individual subscribe failures are reported and skipped. A selection
    /// failure disconnects the device before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if selection fails or the notification stream cannot
    /// be opened.
    #[instrument(skip_all, level = "debug", fields(device_id = device.device().device_id()))]
    pub async fn start(
        device: DeviceSession,
        policy: &SelectionPolicy,
        on_event: &mut dyn FnMut(ProbeEvent<'_>),
    ) -> Result<Self, InteractionError> {
        let selection = match select_characteristics(device.services(), policy) {
            Ok(selection) => selection,
            Err(error) => {
                warn!(%error, "characteristic selection failed, disconnecting");
                discard_shutdown_error("disconnect", device.close().await);
                return Err(error.into());
            }
        };

        let notifications = match device.notifications().await {
            Ok(notifications) => notifications,
            Err(error) => {
                discard_shutdown_error("disconnect", device.close().await);
                return Err(error);
            }
        };

        let mut subscribed = Vec::with_capacity(selection.notify_targets().len());
        for target in selection.notify_targets() {
            match device.subscribe(target).await {
                Ok(()) => {
                    debug!(characteristic = target.uuid(), "subscribed");
                    on_event(ProbeEvent::Subscribed(target));
                    subscribed.push(target.clone());
                }
                Err(error) => {
                    warn!(characteristic = target.uuid(), ?error, "subscribe failed");
                    on_event(ProbeEvent::SubscribeFailed {
                        characteristic: target,
                        error: &error,
                    });
                }
            }
        }

        Ok(Self {
            device,
            selection,
            subscribed,
            notifications,
            logger: NotificationLogger::new(),
            commands_sent: 0,
            commands_failed: 0,
        })
    }

    /// Returns the characteristics chosen for this connection.
    #[must_use]
    pub fn selection(&self) -> &CharacteristicSelection {
        &self.selection
    }

    /// Returns the connected device session.
    #[must_use]
    pub fn device(&self) -> &DeviceSession {
        &self.device
    }

    /// Dispatches one payload, resetting the notification counter first.
    ///
    /// Delivery failure is reported through `on_event` and does not end the
    /// session.
    pub async fn send(
        &mut self,
        payload: &[u8],
        label: Option<&str>,
        on_event: &mut dyn FnMut(ProbeEvent<'_>),
    ) -> bool {
        self.logger.begin_command();
        let dispatcher = CommandDispatcher::new(self.selection.write_candidates());
        match dispatcher.dispatch(&self.device, payload).await {
            Ok(receipt) => {
                self.commands_sent += 1;
                on_event(ProbeEvent::CommandSent {
                    label,
                    receipt: &receipt,
                });
                true
            }
            Err(error) => {
                self.commands_failed += 1;
                warn!(%error, "command not delivered");
                on_event(ProbeEvent::CommandFailed {
                    label,
                    error: &error,
                });
                false
            }
        }
    }

    /// Runs the interactive loop until the quit key, end of input, Ctrl+C,
    /// or an input error, then shuts down in order.
    ///
    /// Pending notifications are always logged before the next key is read.
    ///
    /// # Errors
    ///
    /// Returns an error if reading operator input fails. The device is still
    /// shut down first.
    pub async fn run_interactive(
        self,
        keys: OperatorKeys,
        presets: &PresetTable,
        on_event: &mut dyn FnMut(ProbeEvent<'_>),
    ) -> Result<SessionSummary, InteractionError> {
        self.run_interactive_until(keys, presets, interrupt_signal(), on_event)
            .await
    }

    /// Same as [`Self::run_interactive`], but stops with
    /// [`StopReason::Interrupted`] when `interrupt` completes instead of
    /// waiting for Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if reading operator input fails. The device is still
    /// shut down first.
    pub async fn run_interactive_until<F>(
        mut self,
        mut keys: OperatorKeys,
        presets: &PresetTable,
        interrupt: F,
        on_event: &mut dyn FnMut(ProbeEvent<'_>),
    ) -> Result<SessionSummary, InteractionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let stop_reason = loop {
            tokio::select! {
                biased;
                Some(notification) = self.notifications.next() => {
                    let record = self.logger.record(&notification);
                    on_event(ProbeEvent::Notification(&record));
                }
                () = &mut interrupt => break StopReason::Interrupted,
                key = keys.next() => {
                    let key = match key {
                        None => break StopReason::InputClosed,
                        Some(Ok(key)) => key,
                        Some(Err(error)) => {
                            self.shutdown().await;
                            return Err(error);
                        }
                    };
                    match presets.action_for(key) {
                        OperatorAction::Quit => break StopReason::QuitKey,
                        OperatorAction::ListPresets => on_event(ProbeEvent::PresetList(presets)),
                        OperatorAction::Unbound(key) => on_event(ProbeEvent::UnboundKey(key)),
                        OperatorAction::Send(preset) => {
                            self.send(preset.payload(), Some(preset.label()), on_event).await;
                        }
                    }
                }
            }
        };

        Ok(self.finish(stop_reason).await)
    }

    /// Sends one payload, logs notifications for `listen`, then shuts down.
    ///
    /// Ctrl+C ends the listen window early.
    pub async fn run_single(
        mut self,
        payload: &[u8],
        label: Option<&str>,
        listen: Duration,
        on_event: &mut dyn FnMut(ProbeEvent<'_>),
    ) -> SessionSummary {
        self.send(payload, label, on_event).await;

        let deadline = Instant::now() + listen;
        let interrupt = interrupt_signal();
        tokio::pin!(interrupt);
        let stop_reason = loop {
            tokio::select! {
                biased;
                Some(notification) = self.notifications.next() => {
                    let record = self.logger.record(&notification);
                    on_event(ProbeEvent::Notification(&record));
                }
                () = sleep_until(deadline) => break StopReason::ListenWindowElapsed,
                () = &mut interrupt => break StopReason::Interrupted,
            }
        };

        self.finish(stop_reason).await
    }

    async fn finish(self, stop_reason: StopReason) -> SessionSummary {
        let summary = SessionSummary {
            commands_sent: self.commands_sent,
            commands_failed: self.commands_failed,
            notifications_logged: self.logger.total_logged(),
            stop_reason,
        };
        info!(
            commands_sent = summary.commands_sent,
            commands_failed = summary.commands_failed,
            notifications_logged = summary.notifications_logged,
            %stop_reason,
            "probe session finished"
        );
        self.shutdown().await;
        summary
    }

    /// Unsubscribes from every subscribed target, then disconnects.
    ///
    /// Both steps are best-effort.
    #[instrument(skip_all, level = "debug")]
    pub async fn shutdown(self) {
        for target in &self.subscribed {
            discard_shutdown_error("unsubscribe", self.device.unsubscribe(target).await);
        }
        drop(self.notifications);
        discard_shutdown_error("disconnect", self.device.close().await);
    }
}

async fn interrupt_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        debug!(?error, "failed to wait for ctrl-c");
        std::future::pending::<()>().await;
    }
}
