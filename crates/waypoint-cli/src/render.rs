//! Plain-text output for the terminal.

use std::fmt::Write;

use waypoint_core::{InvestigationState, Wave};

/// Outcome of a finished investigation.
pub fn render_outcome(state: &InvestigationState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Investigation {}", state.id());
    let _ = writeln!(out, "{}", state.identifiers().summary());
    let _ = writeln!(
        out,
        "Mode: {}  Issue: {}",
        state.transport_mode(),
        state.issue_type()
    );

    let failures = state.timeline().iter().filter(|e| e.is_error).count();
    if failures > 0 {
        let _ = writeln!(out, "Recovered failures: {}", failures);
    }
    out.push('\n');

    if let Some(root) = state.root_cause() {
        let _ = writeln!(
            out,
            "Root cause: {} ({:.0}% confidence)",
            root.description,
            root.confidence * 100.0
        );
        let _ = writeln!(out, "Recommended actions:");
        for action in &root.recommended_actions {
            let _ = writeln!(out, "  - {}", action);
        }
    } else if let Some(question) = state.human_question() {
        let _ = writeln!(out, "Needs human review");
        let _ = writeln!(out, "{}", question);
    }

    out.trim_end().to_string()
}

pub fn render_wave(wave: &Wave) -> String {
    let names: Vec<&str> = wave.collectors.iter().map(|c| c.as_str()).collect();
    format!("wave {}: {}", wave.index, names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use waypoint_core::{
        plan_waves, CollectorRegistry, InvestigationConfig, Investigator, InvestigatorServices,
        TransportMode, UnavailableModel,
    };

    #[test]
    fn renders_ocean_plan() {
        let lines: Vec<String> = plan_waves(TransportMode::Ocean)
            .iter()
            .map(render_wave)
            .collect();
        assert_eq!(lines[1], "wave 2: ocean_events, ocean_subscription, vessel_schedule");
        assert!(lines[0].contains("config_lookup"));
    }

    #[tokio::test]
    async fn renders_escalation() {
        let services = InvestigatorServices {
            model: Arc::new(UnavailableModel),
            registry: Arc::new(CollectorRegistry::new()),
        };
        let investigator = Investigator::new(services, InvestigationConfig::default()).unwrap();
        let mut manual = BTreeMap::new();
        manual.insert("tracking_id".to_string(), "614258134".to_string());
        let state = investigator.run("", &manual).await.unwrap();

        let text = render_outcome(&state);
        assert!(text.contains("tracking_id=614258134"));
        assert!(text.contains("Needs human review"));
        assert!(text.contains("No hypotheses formed"));
    }
}
