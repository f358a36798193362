#![no_main]

use libfuzzer_sys::fuzz_target;
use thumbwright::ops::{MAX_PLAN_DIMENSION, MIN_PLAN_DIMENSION};
use thumbwright::{TransformPlan, TransformRequest};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(plan) = TransformPlan::parse(input) {
        assert!(!plan.is_empty());
        assert!(plan.ops().iter().filter(|op| op.is_scale()).count() <= 1);
        for op in plan.ops() {
            let (w, h) = op.dimensions();
            assert!((MIN_PLAN_DIMENSION..=MAX_PLAN_DIMENSION).contains(&w));
            assert!((MIN_PLAN_DIMENSION..=MAX_PLAN_DIMENSION).contains(&h));
        }
        // Canonical form parses back to the same plan
        let reparsed = TransformPlan::parse(&plan.to_string()).expect("canonical plan must parse");
        assert_eq!(reparsed, plan);
    }

    let _ = TransformRequest::parse(input);
});
