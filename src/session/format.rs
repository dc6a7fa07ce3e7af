// Plain-text rendering of cache contents for introspection replies

use super::{StatusReport, StreamStatus};
use crate::color::mirek_to_kelvin;
use crate::resolver::Target;
use crate::state::{Arena, CacheSummary, Group, Light, LightColor, Scene};

pub(super) fn listing(title: &str, lines: &[String]) -> String {
    if lines.is_empty() {
        return format!("{}: none", title);
    }
    let mut out = format!("{}:", title);
    for line in lines {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}

pub(super) fn light_line(light: &Light) -> String {
    let mut parts = vec![if light.on { "on" } else { "off" }.to_string()];
    if light.on {
        if let Some(brightness) = light.brightness {
            parts.push(format!("{:.0}%", brightness));
        }
        match &light.color {
            Some(LightColor::Temperature { mirek }) => {
                parts.push(format!("{}K", mirek_to_kelvin(*mirek)))
            }
            Some(LightColor::Xy(xy)) => parts.push(format!("xy {:.3},{:.3}", xy.x, xy.y)),
            None => {}
        }
    }
    if !light.reachable {
        parts.push("unreachable".to_string());
    }
    format!("{}: {}", light.name, parts.join(", "))
}

pub(super) fn group_line(arena: &Arena, group: &Group) -> String {
    let lights = arena.lights_for(&group_target(arena, group));
    let on = lights.iter().filter(|l| l.on).count();
    format!("{} ({} lights, {} on)", group.name, lights.len(), on)
}

pub(super) fn scene_line(arena: &Arena, scene: &Scene) -> String {
    let group = scene
        .group
        .as_ref()
        .and_then(|g| arena.group(&g.rid))
        .map(|g| g.name.as_str());
    let active = matches!(scene.active.as_deref(), Some(s) if s != "inactive");
    match (group, active) {
        (Some(group), true) => format!("{} ({}, active)", scene.name, group),
        (Some(group), false) => format!("{} ({})", scene.name, group),
        (None, true) => format!("{} (active)", scene.name),
        (None, false) => scene.name.clone(),
    }
}

pub(super) fn summary_line(summary: &CacheSummary) -> String {
    format!(
        "{} lights ({} on, {} unreachable), {} rooms, {} zones, {} scenes",
        summary.lights,
        summary.lights_on,
        summary.unreachable_lights,
        summary.rooms,
        summary.zones,
        summary.scenes
    )
}

pub(super) fn status_report(report: &StatusReport) -> String {
    let stream = match report.stream {
        StreamStatus::Disabled => "disabled".to_string(),
        StreamStatus::Connected => "connected".to_string(),
        StreamStatus::Rejected => "stopped, credentials rejected".to_string(),
        StreamStatus::Reconnecting => {
            format!("reconnecting ({} reconnects)", report.metrics.reconnects)
        }
    };
    let synced = report
        .cache
        .last_sync
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    let mut out = format!(
        "Bridge {}: {}\nEvent stream: {}, {} events applied\nLast sync: {} (generation {})",
        report.bridge,
        summary_line(&report.cache),
        stream,
        report.metrics.events_applied,
        synced,
        report.cache.generation
    );
    if report.auth_failed {
        out.push_str("\nCredentials rejected: pair with the bridge again");
    }
    out
}

fn group_target(arena: &Arena, group: &Group) -> Target {
    if arena.room(&group.id).is_some() {
        Target::Room {
            id: group.id.clone(),
            name: group.name.clone(),
        }
    } else {
        Target::Zone {
            id: group.id.clone(),
            name: group.name.clone(),
        }
    }
}
