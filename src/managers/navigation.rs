use crate::constants::{limits, ui};
use crate::errors::BotError;
use crate::gateway::{Button, Keyboard};
use crate::services::access::UserId;
use crate::services::registry::{Action, Host, Registry};
use crate::utils::text::{escape_html, truncate_for_message, MAX_MESSAGE_CHARS};
use serde::{Deserialize, Serialize};

const HISTORY_VIEW: &str = "history";

/// Navigation progress carried in each button's callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionToken {
    Empty,
    HistoryRequest,
    HostOnly(String),
    HostAction(String, String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenWire {
    #[serde(rename = "h", alias = "host", default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(rename = "a", alias = "action", default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    view: Option<String>,
}

impl SelectionToken {
    pub fn encode(&self) -> String {
        let wire = match self {
            SelectionToken::Empty => TokenWire::default(),
            SelectionToken::HistoryRequest => TokenWire {
                view: Some(HISTORY_VIEW.to_string()),
                ..TokenWire::default()
            },
            SelectionToken::HostOnly(host) => TokenWire {
                host: Some(host.clone()),
                ..TokenWire::default()
            },
            SelectionToken::HostAction(host, action) => TokenWire {
                host: Some(host.clone()),
                action: Some(action.clone()),
                ..TokenWire::default()
            },
        };
        serde_json::to_string(&wire).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn decode(payload: &str) -> Result<Self, BotError> {
        let wire: TokenWire = serde_json::from_str(payload).map_err(|err| {
            BotError::unknown_selection(format!("Malformed selection payload: {}", err))
        })?;
        match (wire.view.as_deref(), wire.host, wire.action) {
            (None, None, None) => Ok(SelectionToken::Empty),
            (Some(HISTORY_VIEW), None, None) => Ok(SelectionToken::HistoryRequest),
            (None, Some(host), None) => Ok(SelectionToken::HostOnly(host)),
            (None, Some(host), Some(action)) => Ok(SelectionToken::HostAction(host, action)),
            _ => Err(BotError::unknown_selection(format!(
                "Unsupported selection payload: {}",
                payload
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<'a> {
    Unauthorized,
    HostMenu,
    ActionMenu(&'a Host),
    Cancelled,
    HistoryView,
    Execute(&'a Host, &'a Action),
    UnknownSelection(String),
}

/// Next step for an interaction. `token` is `None` for a fresh start.
pub fn decide<'a>(
    registry: &'a Registry,
    authorized: bool,
    token: Option<&SelectionToken>,
) -> Decision<'a> {
    if !authorized {
        return Decision::Unauthorized;
    }
    let Some(token) = token else {
        return Decision::HostMenu;
    };
    match token {
        SelectionToken::Empty => Decision::Cancelled,
        SelectionToken::HistoryRequest => Decision::HistoryView,
        SelectionToken::HostOnly(alias) => match registry.host(alias) {
            Some(host) => Decision::ActionMenu(host),
            None => Decision::UnknownSelection(format!("unknown host '{}'", alias)),
        },
        SelectionToken::HostAction(host_alias, action_alias) => {
            match (registry.host(host_alias), registry.action(action_alias)) {
                (Some(host), Some(action)) => Decision::Execute(host, action),
                (None, _) => Decision::UnknownSelection(format!("unknown host '{}'", host_alias)),
                (_, None) => {
                    Decision::UnknownSelection(format!("unknown action '{}'", action_alias))
                }
            }
        }
    }
}

fn grid(buttons: Vec<Button>) -> Keyboard {
    buttons
        .chunks(limits::MENU_COLUMNS)
        .map(|row| row.to_vec())
        .collect()
}

pub fn host_menu(registry: &Registry) -> Keyboard {
    let mut keyboard = grid(
        registry
            .hosts()
            .iter()
            .map(|host| {
                Button::new(
                    host.alias.clone(),
                    SelectionToken::HostOnly(host.alias.clone()).encode(),
                )
            })
            .collect(),
    );
    keyboard.push(vec![Button::new(
        ui::HISTORY_LABEL,
        SelectionToken::HistoryRequest.encode(),
    )]);
    keyboard
}

pub fn action_menu(registry: &Registry, host: &Host) -> Keyboard {
    let mut keyboard = grid(
        registry
            .actions()
            .iter()
            .map(|action| {
                Button::new(
                    action.alias.clone(),
                    SelectionToken::HostAction(host.alias.clone(), action.alias.clone()).encode(),
                )
            })
            .collect(),
    );
    keyboard.push(vec![Button::new(
        ui::CANCEL_LABEL,
        SelectionToken::Empty.encode(),
    )]);
    keyboard
}

/// Every host/action payload must fit the chat surface's callback limit.
pub fn validate_payload_sizes(registry: &Registry) -> Result<(), BotError> {
    for host in registry.hosts() {
        for action in registry.actions() {
            let payload = SelectionToken::HostAction(host.alias.clone(), action.alias.clone()).encode();
            if payload.len() > limits::CALLBACK_PAYLOAD_MAX_BYTES {
                return Err(BotError::config(format!(
                    "Aliases too long: host '{}' with action '{}' encodes to {} bytes (max {})",
                    host.alias,
                    action.alias,
                    payload.len(),
                    limits::CALLBACK_PAYLOAD_MAX_BYTES
                ))
                .with_hint("Shorten the host or action alias"));
            }
        }
    }
    Ok(())
}

pub fn rejection_text(user: UserId) -> String {
    format!("User <b>{}</b> is not allowed here. Sorry.", user)
}

pub fn host_selected_text(host: &Host) -> String {
    format!("Host: <b>{}</b>", escape_html(&host.alias))
}

pub fn result_text(command: &str, output: &str) -> String {
    let body = format!(
        "<code>{}</code>: <code>{}</code>",
        escape_html(command),
        escape_html(output)
    );
    if body.chars().count() <= MAX_MESSAGE_CHARS {
        return body;
    }
    let clipped = truncate_for_message(output, MAX_MESSAGE_CHARS.saturating_sub(command.len() + 64));
    format!(
        "<code>{}</code>: <code>{}</code>",
        escape_html(command),
        escape_html(&clipped)
    )
}

pub fn error_text(cause: &str) -> String {
    format!(
        "<b>Error</b>: <code>{}</code>",
        escape_html(&truncate_for_message(cause, MAX_MESSAGE_CHARS))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(
            vec![
                Host::with_password("web", "10.0.0.1", "root", "pw"),
                Host::with_password("db", "10.0.0.2", "root", "pw"),
                Host::with_key("cache", "10.0.0.3", "root", "/k"),
            ],
            vec![
                crate::services::registry::Action::new("uptime", "uptime"),
                crate::services::registry::Action::new("disk", "df -h"),
            ],
        )
        .expect("registry")
    }

    #[test]
    fn wire_format_is_compact() {
        assert_eq!(SelectionToken::Empty.encode(), "{}");
        assert_eq!(SelectionToken::HistoryRequest.encode(), r#"{"v":"history"}"#);
        assert_eq!(
            SelectionToken::HostAction("web".into(), "uptime".into()).encode(),
            r#"{"h":"web","a":"uptime"}"#
        );
    }

    #[test]
    fn decode_accepts_every_variant() {
        for token in [
            SelectionToken::Empty,
            SelectionToken::HistoryRequest,
            SelectionToken::HostOnly("web".into()),
            SelectionToken::HostAction("web".into(), "disk".into()),
        ] {
            assert_eq!(SelectionToken::decode(&token.encode()).expect("decode"), token);
        }
    }

    #[test]
    fn decode_accepts_long_field_names() {
        assert_eq!(
            SelectionToken::decode(r#"{"host":"web","action":"disk"}"#).expect("decode"),
            SelectionToken::HostAction("web".into(), "disk".into())
        );
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        for payload in ["not json", r#"{"a":"disk"}"#, r#"{"v":"other"}"#, r#"{"x":1}"#] {
            let err = SelectionToken::decode(payload).unwrap_err();
            assert_eq!(err.kind, crate::errors::BotErrorKind::UnknownSelection, "{}", payload);
        }
    }

    #[test]
    fn unauthorized_short_circuits_every_token() {
        let registry = registry();
        assert_eq!(decide(&registry, false, None), Decision::Unauthorized);
        assert_eq!(
            decide(&registry, false, Some(&SelectionToken::HostAction("web".into(), "uptime".into()))),
            Decision::Unauthorized
        );
    }

    #[test]
    fn transitions_follow_token_shape() {
        let registry = registry();
        assert_eq!(decide(&registry, true, None), Decision::HostMenu);
        assert_eq!(decide(&registry, true, Some(&SelectionToken::Empty)), Decision::Cancelled);
        assert_eq!(
            decide(&registry, true, Some(&SelectionToken::HistoryRequest)),
            Decision::HistoryView
        );
        assert!(matches!(
            decide(&registry, true, Some(&SelectionToken::HostOnly("db".into()))),
            Decision::ActionMenu(host) if host.alias == "db"
        ));
    }

    #[test]
    fn every_rendered_action_button_executes() {
        let registry = registry();
        for host in registry.hosts() {
            for row in action_menu(&registry, host) {
                for button in row {
                    let token = SelectionToken::decode(&button.payload).expect("decode");
                    if token == SelectionToken::Empty {
                        continue;
                    }
                    assert!(matches!(
                        decide(&registry, true, Some(&token)),
                        Decision::Execute(h, a) if h.alias == host.alias && a.alias == button.label
                    ));
                }
            }
        }
    }

    #[test]
    fn unknown_aliases_become_unknown_selection() {
        let registry = registry();
        assert!(matches!(
            decide(&registry, true, Some(&SelectionToken::HostOnly("gone".into()))),
            Decision::UnknownSelection(reason) if reason.contains("gone")
        ));
        assert!(matches!(
            decide(&registry, true, Some(&SelectionToken::HostAction("web".into(), "rm".into()))),
            Decision::UnknownSelection(reason) if reason.contains("action 'rm'")
        ));
    }

    #[test]
    fn host_menu_lays_out_two_per_row_with_history_last() {
        let keyboard = host_menu(&registry());
        let labels: Vec<Vec<&str>> = keyboard
            .iter()
            .map(|row| row.iter().map(|b| b.label.as_str()).collect())
            .collect();
        assert_eq!(labels, vec![vec!["web", "db"], vec!["cache"], vec!["History"]]);
    }

    #[test]
    fn action_menu_ends_with_cancel_row() {
        let registry = registry();
        let host = registry.host("web").expect("host");
        let keyboard = action_menu(&registry, host);
        assert_eq!(keyboard.len(), 2);
        assert_eq!(keyboard[0].len(), 2);
        assert_eq!(keyboard[1], vec![Button::new("Cancel", "{}")]);
    }

    #[test]
    fn oversized_aliases_fail_validation() {
        let long = "x".repeat(60);
        let registry = Registry::new(
            vec![Host::with_password(&long, "h", "u", "p")],
            vec![crate::services::registry::Action::new("uptime", "uptime")],
        )
        .expect("registry");
        assert!(validate_payload_sizes(&registry).unwrap_err().is_config());
        assert!(validate_payload_sizes(&self::registry()).is_ok());
    }

    #[test]
    fn result_text_escapes_and_fits() {
        assert_eq!(
            result_text("echo <hi>", "<hi>"),
            "<code>echo &lt;hi&gt;</code>: <code>&lt;hi&gt;</code>"
        );
        let huge = "y".repeat(10_000);
        assert!(result_text("cat big", &huge).chars().count() <= MAX_MESSAGE_CHARS + 64);
    }
}
