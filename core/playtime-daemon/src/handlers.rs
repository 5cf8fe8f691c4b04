//! Request dispatch. Every method maps to one engine call.

use std::collections::BTreeMap;

use playtime_core::{display_text, summary_text, DisplayHandle, PartitionId, SubjectId};
use playtime_protocol::{
    parse_presence_params, parse_subject_params, HealthData, Method, PlaytimeData, ReadyData,
    ReportData, Request, Response, ToggleData, PROTOCOL_VERSION,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::server::DaemonState;

pub fn handle_request(request: Request, state: &DaemonState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let data = HealthData {
                status: "ok".to_string(),
                pid: std::process::id(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                protocol_version: PROTOCOL_VERSION,
                tracked_subjects: state.engine().presence().tracked_subjects().len(),
            };
            respond(request.id, &data)
        }
        Method::Ready => {
            let target = match parse_presence_params(request.params) {
                Ok(target) => target,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            let subject = SubjectId::from(target.subject);
            let partition = PartitionId::from(target.partition);
            info!(subject = %subject, partition = %partition, "Subject ready");

            let presence = state.engine().presence();
            presence.on_ready(subject, partition, handle(state, subject));
            respond(
                request.id,
                &ReadyData {
                    display_active: presence.is_display_active(subject),
                },
            )
        }
        Method::Command => {
            let target = match parse_presence_params(request.params) {
                Ok(target) => target,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            let subject = SubjectId::from(target.subject);
            let partition = PartitionId::from(target.partition);

            let report = state.engine().presence().on_command(subject, partition);
            debug!(subject = %subject, partition = %partition, total_ms = report.total_ms, "Playtime report");
            respond(
                request.id,
                &ReportData {
                    partition_id: report.partition.to_string(),
                    total_ms: report.total_ms,
                    session_ms: report.session_ms,
                    total_text: summary_text(report.total_ms),
                    session_text: summary_text(report.session_ms),
                },
            )
        }
        Method::Disconnect => {
            let target = match parse_subject_params(request.params) {
                Ok(target) => target,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            let subject = SubjectId::from(target.subject);
            info!(subject = %subject, "Subject disconnected");

            state.engine().presence().on_disconnect(subject);
            Response::ok(request.id, serde_json::json!({ "accepted": true }))
        }
        Method::ToggleDisplay => {
            let target = match parse_subject_params(request.params) {
                Ok(target) => target,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            let subject = SubjectId::from(target.subject);

            let enabled = state
                .engine()
                .presence()
                .toggle_display(subject, handle(state, subject));
            respond(request.id, &ToggleData { enabled })
        }
        Method::GetPlaytime => {
            let target = match parse_subject_params(request.params) {
                Ok(target) => target,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            let subject = SubjectId::from(target.subject);

            let engine = state.engine();
            let total_ms = engine.store().live_total(subject);
            let partitions: BTreeMap<String, u64> = engine
                .store()
                .totals(subject)
                .into_iter()
                .map(|(partition, millis)| (partition.to_string(), millis))
                .collect();
            let display = if engine.presence().is_display_active(subject) {
                state
                    .current_text(subject)
                    .or_else(|| Some(display_text(total_ms)))
            } else {
                None
            };

            respond(
                request.id,
                &PlaytimeData {
                    subject_id: subject.to_string(),
                    total_ms,
                    partitions,
                    summary_text: summary_text(total_ms),
                    display_text: display,
                },
            )
        }
    }
}

fn handle(state: &DaemonState, subject: SubjectId) -> Arc<dyn DisplayHandle> {
    state.display_for(subject)
}

fn respond<T: Serialize>(id: Option<String>, data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize response: {}", err),
        ),
    }
}
