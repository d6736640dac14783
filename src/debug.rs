#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static TRACE: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

/// Records an accepted lane change for the current step.
#[allow(unused)]
pub(crate) fn trace_lane_change(vehicle: u64, from: usize, to: usize) {
    #[cfg(feature = "debug")]
    TRACE.with(|trace| {
        trace.borrow_mut().push(json!({
            "type": "lane_change",
            "vehicle": vehicle,
            "from": from,
            "to": to,
        }))
    })
}

#[cfg(feature = "debug")]
pub(crate) fn take_trace() -> serde_json::Value {
    json!(TRACE.with(|trace| trace.take()))
}
