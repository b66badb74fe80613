use super::gate_metrics::GateMetrics;
use std::sync::Arc;

pub fn render_prometheus(m: &Arc<GateMetrics>) -> String {
    let mut out = String::with_capacity(1024);

    write_counter(&mut out, "opsdeck_gate_requests_total", m.requests_total());
    write_counter(&mut out, "opsdeck_gate_admitted_total", m.admitted_total());
    write_counter(
        &mut out,
        "opsdeck_gate_burst_admissions_total",
        m.burst_admissions_total(),
    );
    write_counter(
        &mut out,
        "opsdeck_gate_rate_limited_total",
        m.rate_limited_total(),
    );
    write_counter(
        &mut out,
        "opsdeck_gate_ban_denials_total",
        m.ban_denials_total(),
    );
    write_counter(&mut out, "opsdeck_gate_replays_total", m.replays_total());
    write_counter(&mut out, "opsdeck_gate_conflicts_total", m.conflicts_total());
    write_counter(
        &mut out,
        "opsdeck_gate_key_required_total",
        m.key_required_total(),
    );
    write_counter(
        &mut out,
        "opsdeck_gate_completions_total",
        m.completions_total(),
    );

    out
}

fn write_counter(out: &mut String, name: &str, val: u64) {
    use std::fmt::Write;
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {val}");
}
