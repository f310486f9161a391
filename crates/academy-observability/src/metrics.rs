use metrics::counter;

/// Counts an assignment attempt by outcome, e.g. `success` or `capacity_exceeded`.
pub fn track_enrollment(outcome: &'static str) {
    counter!("academy_enrollments_total", "outcome" => outcome).increment(1);
}

pub fn track_test_recorded(count: u64) {
    counter!("academy_tests_recorded_total").increment(count);
}

/// Counts an approve/reject decision by the resulting payment status.
pub fn track_payment_decision(status: &'static str) {
    counter!("academy_payment_decisions_total", "status" => status).increment(1);
}
