//! Session scripts
//!
//! A script watches the inbound stream after each state update and answers with
//! [`ScriptAction`]s: requests to send and timers to arm. The controller owns the timers and calls
//! [`SessionScript::timer_expired`] with the token the script chose, so scripts never touch the
//! channel or spawn tasks themselves.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ScriptError;
use crate::messages::{
    ListeningMode, Message, OperationCommand, PowerStatus, Query, Request, ServiceType,
};
use crate::messages::{Inbound, XmlListItem};
use crate::protocol::ProtocolType;
use crate::state::SessionState;

const LISTENING_MODE_DELAY: Duration = Duration::from_millis(1000);
const MAX_LISTENING_MODE_REQUESTS: u32 = 5;

/// What a script asks the controller to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    Send(Request),
    /// Call back `timer_expired(token)` after `delay`.
    Schedule { token: usize, delay: Duration },
}

pub trait SessionScript: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, _protocol: ProtocolType) -> bool {
        true
    }

    /// Called once when the session becomes active.
    fn start(&mut self, _state: &SessionState) -> Vec<ScriptAction> {
        Vec::new()
    }

    /// Called for every inbound message, after the state applied it.
    fn process(&mut self, inbound: &Inbound, state: &SessionState) -> Vec<ScriptAction>;

    fn timer_expired(&mut self, _token: usize, _state: &SessionState) -> Vec<ScriptAction> {
        Vec::new()
    }

    /// Requests sent while the session stops.
    fn finish(&mut self, _state: &SessionState) -> Vec<Request> {
        Vec::new()
    }
}

// ============================================================================
// Built-in scripts
// ============================================================================

/// Switches the receiver on at the first power report if it is in standby.
#[derive(Debug, Default)]
pub struct AutoPower {
    done: bool,
}

impl SessionScript for AutoPower {
    fn name(&self) -> &'static str {
        "auto-power"
    }

    fn process(&mut self, inbound: &Inbound, state: &SessionState) -> Vec<ScriptAction> {
        if self.done || state.is_on() || !matches!(inbound.message, Message::PowerStatus { .. }) {
            return Vec::new();
        }
        info!("Requesting auto power on");
        self.done = true;
        vec![ScriptAction::Send(Request::Send(Message::PowerStatus {
            zone: state.active_zone,
            status: PowerStatus::On,
        }))]
    }
}

/// Puts all zones into standby when the session stops.
#[derive(Debug, Default)]
pub struct AllStandby;

impl SessionScript for AllStandby {
    fn name(&self) -> &'static str {
        "all-standby"
    }

    fn process(&mut self, _inbound: &Inbound, _state: &SessionState) -> Vec<ScriptAction> {
        Vec::new()
    }

    fn finish(&mut self, state: &SessionState) -> Vec<Request> {
        if !state.is_on() {
            return Vec::new();
        }
        info!("Switching all zones to standby");
        vec![Request::Send(Message::PowerStatus {
            zone: 0,
            status: PowerStatus::AllStandby,
        })]
    }
}

/// Re-queries an unknown (`FF`) listening mode, at most five times one second apart.
#[derive(Debug, Default)]
pub struct ListeningModeRetry {
    requests: u32,
    pending: bool,
}

impl SessionScript for ListeningModeRetry {
    fn name(&self) -> &'static str {
        "listening-mode-retry"
    }

    fn supports(&self, protocol: ProtocolType) -> bool {
        protocol == ProtocolType::Iscp
    }

    fn start(&mut self, _state: &SessionState) -> Vec<ScriptAction> {
        self.requests = 0;
        Vec::new()
    }

    fn process(&mut self, inbound: &Inbound, _state: &SessionState) -> Vec<ScriptAction> {
        let Message::ListeningMode(mode) = &inbound.message else {
            return Vec::new();
        };
        if mode.0 != ListeningMode::UNKNOWN
            || self.requests >= MAX_LISTENING_MODE_REQUESTS
            || self.pending
        {
            return Vec::new();
        }
        debug!("Scheduling listening mode request in {:?}", LISTENING_MODE_DELAY);
        self.pending = true;
        vec![ScriptAction::Schedule {
            token: 0,
            delay: LISTENING_MODE_DELAY,
        }]
    }

    fn timer_expired(&mut self, _token: usize, state: &SessionState) -> Vec<ScriptAction> {
        self.pending = false;
        self.requests += 1;
        info!("Re-requesting listening mode [{}]", self.requests);
        vec![ScriptAction::Send(Request::query(
            Query::ListeningMode,
            state.active_zone,
        ))]
    }
}

// ============================================================================
// Shortcut script
// ============================================================================

#[derive(Debug, Deserialize)]
struct ScriptXml {
    #[serde(rename = "@host")]
    host: Option<String>,
    #[serde(rename = "@port")]
    port: Option<String>,
    #[serde(rename = "@zone")]
    zone: Option<String>,
    #[serde(rename = "@tab")]
    tab: Option<String>,
    #[serde(rename = "send", default)]
    actions: Vec<SendXml>,
}

#[derive(Debug, Deserialize)]
struct SendXml {
    #[serde(rename = "@cmd")]
    cmd: Option<String>,
    #[serde(rename = "@par")]
    par: Option<String>,
    #[serde(rename = "@wait")]
    wait: Option<String>,
    #[serde(rename = "@resp")]
    resp: Option<String>,
    #[serde(rename = "@listitem")]
    listitem: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Unsent,
    Waiting,
    Done,
}

/// How an action completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait {
    Time(Duration),
    /// Inbound code, with an optional expected parameter or list item.
    Response(String),
}

#[derive(Debug, Clone)]
pub struct PendingAction {
    pub cmd: String,
    pub par: String,
    pub wait: Wait,
    pub resp: String,
    pub listitem: String,
    pub state: ActionState,
}

impl PendingAction {
    fn wait_code(&self) -> Option<&str> {
        match &self.wait {
            Wait::Response(code) => Some(code),
            Wait::Time(_) => None,
        }
    }
}

/// Connection a shortcut was recorded for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTarget {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub zone: Option<usize>,
    pub tab: Option<String>,
}

fn unescape(s: &str) -> String {
    s.replace("~lt~", "<")
        .replace("~gt~", ">")
        .replace("~dq~", "\"")
}

/// A recorded sequence of commands, each sent once the previous one completed.
///
/// ```xml
/// <onpcScript host="192.168.1.80" port="60128" zone="0">
///   <send cmd="PWR" par="01" wait="PWR" resp="01"/>
///   <send cmd="SLI" par="2B" wait="NLT"/>
///   <send cmd="NSV" par="0E0" wait="NLA" listitem="My Presets"/>
///   <send cmd="NLA" par="My Presets" wait="1000"/>
/// </onpcScript>
/// ```
#[derive(Debug, Clone)]
pub struct ShortcutScript {
    target: ScriptTarget,
    actions: Vec<PendingAction>,
}

impl ShortcutScript {
    pub fn parse(xml: &str) -> Result<Self, ScriptError> {
        let doc: ScriptXml = quick_xml::de::from_str(xml)
            .map_err(|e| ScriptError::InvalidXml(e.to_string()))?;

        let mut actions = Vec::with_capacity(doc.actions.len());
        for send in doc.actions {
            let cmd = send
                .cmd
                .ok_or_else(|| ScriptError::InvalidXml("missing command code in 'send'".into()))?;
            let par = send.par.ok_or_else(|| {
                ScriptError::InvalidXml(format!("missing parameter in 'send' {}", cmd))
            })?;
            let wait = match send.wait.as_deref().map(str::trim) {
                Some(w) => match w.parse::<i64>() {
                    Ok(ms) if ms >= 0 => Wait::Time(Duration::from_millis(ms as u64)),
                    Ok(_) => return Err(ScriptError::MissingWait(cmd)),
                    Err(_) if !w.is_empty() => Wait::Response(w.to_string()),
                    Err(_) => return Err(ScriptError::MissingWait(cmd)),
                },
                None => return Err(ScriptError::MissingWait(cmd)),
            };
            actions.push(PendingAction {
                cmd,
                par: unescape(&par),
                wait,
                resp: unescape(send.resp.as_deref().unwrap_or("")),
                listitem: unescape(send.listitem.as_deref().unwrap_or("")),
                state: ActionState::Unsent,
            });
        }
        if actions.is_empty() {
            return Err(ScriptError::Empty);
        }
        for a in &actions {
            debug!("Script action {}/{} wait {:?}", a.cmd, a.par, a.wait);
        }

        let target = ScriptTarget {
            host: doc.host.filter(|h| !h.is_empty()),
            port: doc.port.and_then(|p| p.trim().parse().ok()),
            zone: doc.zone.and_then(|z| z.trim().parse().ok()),
            tab: doc.tab,
        };
        Ok(Self { target, actions })
    }

    pub fn target(&self) -> &ScriptTarget {
        &self.target
    }

    pub fn actions(&self) -> &[PendingAction] {
        &self.actions
    }

    pub fn is_done(&self) -> bool {
        self.actions.iter().all(|a| a.state == ActionState::Done)
    }

    /// Sends actions until one has to wait.
    fn process_next(&mut self, state: &SessionState) -> Vec<ScriptAction> {
        let mut out = Vec::new();
        for index in 0..self.actions.len() {
            if self.actions[index].state == ActionState::Done {
                continue;
            }
            if self.process_action(index, state, &mut out) != ActionState::Done {
                return out;
            }
        }
        info!("All script commands sent");
        out
    }

    fn process_action(
        &mut self,
        index: usize,
        state: &SessionState,
        out: &mut Vec<ScriptAction>,
    ) -> ActionState {
        let action = &self.actions[index];
        if is_state_set(state, &action.cmd, &action.par) {
            let matched = match action.wait_code() {
                Some(wait) => {
                    (!action.resp.is_empty() && is_state_set(state, wait, &action.resp))
                        || is_response_matched(state, action, wait, None)
                }
                None => false,
            };
            debug!("{}/{}: state already set", action.cmd, action.par);
            if matched {
                self.actions[index].state = ActionState::Done;
                return ActionState::Done;
            }
        } else if action.cmd == "NA" && action.par == "NA" {
            debug!("{}: no message to send", index);
        } else {
            let item = match action.cmd.as_str() {
                "NLA" => state
                    .media_items
                    .iter()
                    .rev()
                    .find(|item| item.title == action.par),
                _ => None,
            };
            let request = item
                .map(select_item)
                .unwrap_or_else(|| Request::raw(&action.cmd, &action.par));
            info!("Script sends {}", request.label());
            out.push(ScriptAction::Send(request));
        }

        let action = &mut self.actions[index];
        action.state = ActionState::Waiting;
        if let Wait::Time(delay) = action.wait {
            out.push(ScriptAction::Schedule {
                token: index,
                delay,
            });
        }
        ActionState::Waiting
    }
}

impl SessionScript for ShortcutScript {
    fn name(&self) -> &'static str {
        "shortcut"
    }

    fn start(&mut self, state: &SessionState) -> Vec<ScriptAction> {
        info!("Starting shortcut script with {} actions", self.actions.len());
        self.process_next(state)
    }

    fn process(&mut self, inbound: &Inbound, state: &SessionState) -> Vec<ScriptAction> {
        let Some(action) = self.actions.iter_mut().find(|a| a.state != ActionState::Done) else {
            return Vec::new();
        };
        if action.state != ActionState::Waiting {
            warn!("Script action {} not waiting", action.cmd);
            return Vec::new();
        }
        let Some(wait) = action.wait_code() else {
            return Vec::new();
        };

        if is_response_matched(state, action, &inbound.code, Some(&inbound.params)) {
            debug!("{}/{}: response {} matched", action.cmd, action.par, inbound.code);
            action.state = ActionState::Done;
            return self.process_next(state);
        }

        // Switching to some streaming services resumes the last station without sending a
        // list. Stop playback and select the service again to get the list.
        if state.service_type == Some(ServiceType::TuneIn)
            && wait == "NLA"
            && !action.listitem.is_empty()
            && inbound.code == "NLT"
            && state.is_playback_mode()
        {
            info!("Waiting for a list item but playback is active, returning to list");
            return vec![
                ScriptAction::Send(Request::Send(Message::OperationCommand(
                    OperationCommand::Stop,
                ))),
                ScriptAction::Send(Request::raw(&action.cmd, &action.par)),
            ];
        }
        Vec::new()
    }

    fn timer_expired(&mut self, token: usize, state: &SessionState) -> Vec<ScriptAction> {
        let Some(action) = self.actions.get_mut(token) else {
            return Vec::new();
        };
        debug!("{}/{}: timer expired", action.cmd, action.par);
        action.state = ActionState::Done;
        self.process_next(state)
    }
}

fn select_item(item: &XmlListItem) -> Request {
    match &item.media {
        Some(media) => Request::Send(Message::DcpMediaContainer(media.clone())),
        None => Request::Send(Message::SelectListItem {
            layers: item.layers,
            id: item.id,
        }),
    }
}

fn is_state_set(state: &SessionState, cmd: &str, par: &str) -> bool {
    match cmd {
        "NTC" => par == OperationCommand::Top.code() && state.is_top_layer(),
        "PWR" => par == state.power.code(),
        "SLI" => par == state.input.code(),
        "NSV" => state
            .service_type
            .is_some_and(|s| par == format!("{}0", s.code())),
        _ => false,
    }
}

fn is_response_matched(
    state: &SessionState,
    action: &PendingAction,
    code: &str,
    params: Option<&str>,
) -> bool {
    if action.wait_code() != Some(code) {
        return false;
    }
    if !action.listitem.is_empty() {
        return state.media_items.iter().any(|i| i.title == action.listitem)
            || state.service_items.iter().any(|s| s.name == action.listitem);
    }
    params.is_some_and(|p| action.resp.is_empty() || action.resp == p)
}
