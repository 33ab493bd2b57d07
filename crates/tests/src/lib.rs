//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约测试 (Value 顺序与显示, 错误形态)
//! - 具体场景与组合代数
//! - 蓝图 -> 管道 -> 运行 的端到端测试
//! - 性质测试 (组合性, 扇出往返)

#[cfg(test)]
mod contract_tests {
    use contracts::{PipeError, RunOutcome, Value};

    #[test]
    fn test_value_order_across_kinds() {
        let mut values = vec![
            Value::from("a"),
            Value::Float(1.5),
            Value::Null,
            Value::Int(1),
            Value::Bool(true),
            Value::pair(0, 0),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(1),
                Value::Float(1.5),
                Value::from("a"),
                Value::pair(0, 0),
            ]
        );
        assert_eq!(Value::Int(2), Value::Float(2.0));
    }

    #[test]
    fn test_value_display() {
        let nested = Value::List(vec![Value::pair(1, "x"), Value::Float(2.0), Value::Null]);
        assert_eq!(nested.to_string(), "[(1, 'x'), 2.0, null]");
        assert_eq!(Value::from("top").to_string(), "top");
    }

    #[test]
    fn test_invalid_composition_shape() {
        let err = PipeError::invalid_composition("sum", "relay", "nothing may follow a sink");
        match err {
            PipeError::InvalidParam {
                ref param,
                ref value,
                ..
            } => {
                assert_eq!(param, "composition");
                assert_eq!(value, "sum | relay");
            }
            ref other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_outcome_classification() {
        assert_eq!(RunOutcome::of(&Ok::<_, PipeError>(1)), RunOutcome::Completed);
        assert_eq!(
            RunOutcome::of::<()>(&Err(PipeError::NoResult)),
            RunOutcome::NoResult
        );
        assert_eq!(
            RunOutcome::of::<()>(&Err(PipeError::user("x"))),
            RunOutcome::Failed
        );
    }
}

#[cfg(test)]
mod scenario_tests {
    use contracts::{PipeError, Value};
    use operators::{count, source, split, sum, to_list, window_min, window_quantile};

    fn list(xs: &[i64]) -> Value {
        Value::List(xs.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_window_min_scenario() {
        let out = source([1, 2, 3, 4, 1, 0, 4, 4])
            .then(window_min(2).unwrap())
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out, list(&[1, 1, 2, 3, 1, 0, 0, 4]));
    }

    #[test]
    fn test_window_median_scenario() {
        let out = source([1, 4, 2, 4, 6, 9, 2, 4, 5])
            .then(window_quantile(2, 0.5, None).unwrap())
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out, list(&[1, 4, 4, 4, 6, 9, 9, 4, 5]));
    }

    #[test]
    fn test_frozen_sum_scenario() {
        let frozen = sum().freeze().unwrap();
        for _ in 0..4 {
            source([1, 2, 3, 4]).feed(&frozen).unwrap();
        }
        assert_eq!(frozen.thaw().unwrap(), Value::Int(40));
    }

    #[test]
    fn test_split_count_scenario() {
        let out = source([1, 2, 3, 4])
            .run(split(vec![count(), count()]).unwrap())
            .unwrap();
        assert_eq!(out, Value::pair(4, 4));
    }

    #[test]
    fn test_empty_source_scenario() {
        for sink in [sum(), operators::last(), operators::min(), operators::mean()] {
            let err = source(Vec::<i64>::new()).run(sink).unwrap_err();
            assert!(matches!(err, PipeError::NoResult), "got: {err}");
        }
    }
}

#[cfg(test)]
mod composition_tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use contracts::{PipeCategory, PipeError, Value};
    use operators::{
        compose, count, filter, map, nth, relay, slice, source, source_iter, split, sum, to_list,
        Composed,
    };

    fn composition_err(err: &PipeError) -> bool {
        matches!(err, PipeError::InvalidParam { param, .. } if param == "composition")
    }

    #[test]
    fn test_compose_dispatch() {
        let middle = compose(map(|v| v), filter(|_| true)).unwrap().into_pipe().unwrap();
        assert_eq!(middle.category(), PipeCategory::Middle);

        let value = compose(source([1, 2]), middle.then(sum()).unwrap())
            .unwrap()
            .into_value();
        assert_eq!(value, Some(Value::Int(3)));

        let frozen = count().freeze().unwrap();
        let doubled = compose(map(|v| v), frozen.clone()).unwrap();
        let Composed::Frozen(prefixed) = doubled else {
            panic!("expected a frozen sink");
        };
        assert!(matches!(
            compose(source([7]), prefixed).unwrap(),
            Composed::Fed
        ));
        assert_eq!(frozen.thaw().unwrap(), Value::Int(1));

        let err = compose(frozen, relay()).unwrap_err();
        assert!(composition_err(&err), "got: {err}");
    }

    #[test]
    fn test_errors_detected_before_elements_flow() {
        let pulled = Rc::new(Cell::new(0));
        let seen = Rc::clone(&pulled);
        let counting = source_iter(move || {
            let seen = Rc::clone(&seen);
            (0..3i64).map(move |i| {
                seen.set(seen.get() + 1);
                Value::Int(i)
            })
        });
        let err = counting.run(relay()).unwrap_err();
        assert!(composition_err(&err), "got: {err}");
        assert_eq!(pulled.get(), 0);
    }

    #[test]
    fn test_mixed_fan_categories_rejected() {
        let err = split(vec![relay(), count()]).unwrap_err();
        assert!(composition_err(&err), "got: {err}");
    }

    #[test]
    fn test_early_finish_stops_source() {
        let pulled = Rc::new(Cell::new(0));
        let seen = Rc::clone(&pulled);
        let naturals = source_iter(move || {
            let seen = Rc::clone(&seen);
            (0i64..).map(move |i| {
                seen.set(seen.get() + 1);
                Value::Int(i)
            })
        });
        let out = naturals
            .then(slice(None, Some(5), None).unwrap())
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out.to_string(), "[0, 1, 2, 3, 4]");
        assert!(pulled.get() <= 6, "pulled {} elements", pulled.get());
    }

    #[test]
    fn test_fan_with_early_finishing_branch() {
        let out = source([5, 6, 7])
            .run(split(vec![nth(0), count()]).unwrap())
            .unwrap();
        assert_eq!(out, Value::pair(5, 3));
    }

    #[test]
    fn test_fanned_source_zips() {
        let zipped = source([1, 2, 3]).and(source(["a", "b", "c"])).unwrap();
        let out = zipped.run(to_list()).unwrap();
        assert_eq!(out.to_string(), "[(1, 'a'), (2, 'b'), (3, 'c')]");
    }
}

#[cfg(test)]
mod blueprint_e2e_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{PipeError, Value};
    use observability::RunMetricsAggregator;
    use operators::{build_pipe, build_source};

    const ROLLING: &str = r#"
name = "rolling-stats"
seed = 3

[source]
kind = "values"
values = [1, 4, 2, 4, 6, 9, 2, 4, 5]

[[stages]]
op = "window_quantile"
window = 3
quantile = 0.5

[[stages]]
op = "fan"
branches = [
    [{ op = "to_list" }],
    [{ op = "max" }],
    [{ op = "slice", start = 2, stop = 4 }, { op = "sum" }],
]
"#;

    fn run_blueprint(content: &str, format: ConfigFormat) -> Result<Value, PipeError> {
        let bp = ConfigLoader::load_from_str(content, format)?;
        let source = build_source(bp.source.as_ref().ok_or(PipeError::NoResult)?)?;
        source.run(build_pipe(&bp)?)
    }

    #[test]
    fn test_toml_blueprint_end_to_end() {
        let out = run_blueprint(ROLLING, ConfigFormat::Toml).unwrap();
        assert_eq!(out.to_string(), "([1, 4, 2, 4, 4, 6, 6, 4, 4], 6, 6)");
    }

    #[test]
    fn test_json_blueprint_end_to_end() {
        let content = r#"{
            "source": { "kind": "range", "start": 10, "stop": 0, "step": -3 },
            "stages": [
                { "op": "enumerate" },
                { "op": "cast", "to": ["str", "float"] },
                { "op": "to_list" }
            ]
        }"#;
        let out = run_blueprint(content, ConfigFormat::Json).unwrap();
        assert_eq!(
            out.to_string(),
            "[('0', 10.0), ('1', 7.0), ('2', 4.0), ('3', 1.0)]"
        );
    }

    #[test]
    fn test_round_tripped_blueprint_runs_identically() {
        let bp = ConfigLoader::load_from_str(ROLLING, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        assert_eq!(
            run_blueprint(&json, ConfigFormat::Json).unwrap(),
            run_blueprint(ROLLING, ConfigFormat::Toml).unwrap()
        );
    }

    #[test]
    fn test_reported_runs_aggregate() {
        let bp = ConfigLoader::load_from_str(ROLLING, ConfigFormat::Toml).unwrap();
        let mut aggregator = RunMetricsAggregator::new();
        for _ in 0..3 {
            let source = build_source(bp.source.as_ref().unwrap()).unwrap();
            let (result, report) = source
                .run_reported(build_pipe(&bp).unwrap(), &bp.name)
                .unwrap();
            assert!(result.is_ok());
            assert_eq!(report.ticks, 10);
            aggregator.update(&report);
        }
        let summary = aggregator.summary();
        assert_eq!(summary.total_runs, 3);
        assert_eq!(summary.completed, 3);
        assert!(summary.to_string().contains("Runs: 3"));
    }

    #[test]
    fn test_frozen_blueprint_sink() {
        let content = r#"{ "stages": [{ "op": "cum_mean" }, { "op": "last" }] }"#;
        let bp = ConfigLoader::load_from_str(content, ConfigFormat::Json).unwrap();
        let frozen = build_pipe(&bp).unwrap().freeze().unwrap();
        operators::source([2, 4]).feed(&frozen).unwrap();
        operators::source([6]).feed(&frozen).unwrap();
        assert_eq!(frozen.thaw().unwrap(), Value::Float(4.0));
        assert_eq!(frozen.feeds(), 2);
    }
}

#[cfg(test)]
mod grouping_tests {
    use contracts::{PipeResult, Value};
    use operators::{count, group, source, split, sum, to_list, window_max, Pipe};

    fn parity(v: &Value) -> PipeResult<Value> {
        Ok(Value::Int(v.as_i64().unwrap_or(0).rem_euclid(2)))
    }

    #[test]
    fn test_group_with_windowed_sub_pipes() {
        let per_parity = |k: &Value| -> PipeResult<Pipe> {
            split(vec![operators::constant(k.clone()), window_max(2)?.then(sum())?])
        };
        let out = source([1, 2, 3, 4, 5, 6])
            .then(group(parity, per_parity))
            .unwrap()
            .run(to_list())
            .unwrap();
        // odd: 1,3,5 -> window max 1,3,5 ; even: 2,4,6 -> 2,4,6
        assert_eq!(out.to_string(), "[(1, 9), (0, 12)]");
    }

    #[test]
    fn test_group_counts_feed_frozen_sink() {
        let frozen = to_list().freeze().unwrap();
        for batch in [vec![1, 1, 2], vec![3]] {
            source(batch)
                .then(group(parity, |k: &Value| split(vec![operators::constant(k.clone()), count()])))
                .unwrap()
                .feed(&frozen)
                .unwrap();
        }
        let out = frozen.thaw().unwrap();
        assert_eq!(out.to_string(), "[(1, 2), (0, 1), (1, 1)]");
    }
}

#[cfg(test)]
mod property_tests {
    use contracts::Value;
    use operators::{filter, map, relay, source, split, to_list};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ints(out: Value) -> Vec<Value> {
        match out {
            Value::List(items) => items,
            other => panic!("expected a list, got {other}"),
        }
    }

    proptest! {
        #[test]
        fn test_map_then_filter_matches_two_passes(
            xs in prop::collection::vec(-1000i64..1000, 0..200),
            k in 1i64..7,
        ) {
            let stages = map(move |v: Value| Value::Int(v.as_i64().unwrap_or(0) * k))
                .then(filter(|v: &Value| v.as_i64().is_some_and(|x| x % 3 == 0)))
                .unwrap();
            let got = ints(source(xs.clone()).then(stages).unwrap().run(to_list()).unwrap());

            let mapped: Vec<i64> = xs.iter().map(|x| x * k).collect();
            let expected: Vec<Value> = mapped
                .into_iter()
                .filter(|x| x % 3 == 0)
                .map(Value::Int)
                .collect();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn test_identity_fan_round_trip(xs in prop::collection::vec(any::<i64>(), 0..100)) {
            let fan = split(vec![relay(), relay()]).unwrap();
            let got = ints(source(xs.clone()).then(fan).unwrap().run(to_list()).unwrap());
            let expected: Vec<Value> = xs.iter().map(|&x| Value::pair(x, x)).collect();
            prop_assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_randomized_sum_matches_reference() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let len = rng.random_range(1..100);
            let xs: Vec<i64> = (0..len).map(|_| rng.random_range(-500..500)).collect();
            let got = source(xs.clone()).run(operators::sum()).unwrap();
            assert_eq!(got, Value::Int(xs.iter().sum()));
        }
    }
}
