//! # Property-Based Tests
//!
//! Invariants checked with proptest: the codec round trip, digest and
//! undigest being inverse, and pattern matching agreeing with a linear
//! filter on both backends, compared in stored form.

use chrono::NaiveDate;
use factgraph_core::codec::{decode, encode, index_key};
use factgraph_core::{
    Data, Fact, FactStore, MemoryFactStore, Pattern, RedbFactStore, Value, digested,
    sequential_ids, undigested,
};
use proptest::collection::vec;
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// STRATEGIES
// =============================================================================

fn date() -> impl Strategy<Value = NaiveDate> {
    (1i32..=9999, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("valid date"))
}

/// Every persistable scalar except streams and null.
fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[ -~]{0,12}".prop_map(Value::Str),
        vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        any::<i64>().prop_map(Value::Int),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        (any::<i64>(), 0u32..10).prop_map(|(m, s)| Value::Decimal(Decimal::new(m, s))),
        date().prop_map(Value::Date),
        (date(), 0u32..24, 0u32..60, 0u32..60).prop_map(|(d, h, mi, s)| {
            Value::DateTime(d.and_hms_opt(h, mi, s).expect("valid time"))
        }),
        any::<bool>().prop_map(Value::Bool),
    ]
}

/// Nested data that digests and rebuilds losslessly: containers are
/// non-empty, keys never collide with the membership attribute, and
/// strings never look like sequential ids.
fn data() -> impl Strategy<Value = Data> {
    let leaf = prop_oneof![
        "[a-z]{1,8}".prop_map(Data::from),
        any::<i64>().prop_map(Data::from),
        any::<bool>().prop_map(Data::from),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 1..4).prop_map(Data::List),
            vec(("[a-h]{1,6}", inner), 1..4).prop_map(Data::map),
        ]
    })
}

/// Datetimes on one day, some with sub-second precision the store drops.
fn instant() -> impl Strategy<Value = Value> {
    (0u32..2, prop::sample::select(vec![0u32, 250, 999])).prop_map(|(s, ms)| {
        Value::DateTime(
            NaiveDate::from_ymd_opt(2020, 6, 1)
                .and_then(|d| d.and_hms_milli_opt(12, 0, s, ms))
                .expect("valid datetime"),
        )
    })
}

/// Values with edge cases in their stored form: NaN, signed zero,
/// decimals at several scales and sub-second datetimes.
fn stored_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::sample::select(vec!["a", "b"]).prop_map(Value::from),
        (0i64..3).prop_map(Value::Int),
        prop::sample::select(vec![f64::NAN, 0.0, -0.0, 1.5]).prop_map(Value::Float),
        (0i64..3, 0u32..3).prop_map(|(m, scale)| {
            let mut d = Decimal::from(m);
            d.rescale(scale);
            Value::Decimal(d)
        }),
        instant(),
    ]
}

fn facts() -> impl Strategy<Value = Vec<Fact>> {
    vec(
        (
            prop::sample::select(vec!["1", "2", "3"]),
            prop::sample::select(vec!["name", "age", "tag"]),
            stored_value(),
        )
            .prop_map(|(e, a, v)| Fact::new(e, a, v)),
        0..24,
    )
}

fn pattern() -> impl Strategy<Value = Pattern> {
    (
        prop::option::of(prop::sample::select(vec!["1", "2", "4"])),
        prop::option::of(prop::sample::select(vec!["name", "age", "none"])),
        prop::option::of(prop_oneof![
            Just(Value::from("a")),
            Just(Value::Int(1)),
            Just(Value::Bool(true)),
            Just(Value::Float(f64::NAN)),
            Just(Value::Float(0.0)),
            Just(Value::Decimal(Decimal::new(10, 1))),
            instant(),
        ]),
    )
        .prop_map(|(entity, attribute, value)| Pattern {
            entity: entity.map(str::to_string),
            attribute: attribute.map(str::to_string),
            value,
        })
}

/// Facts as `(entity, attribute, index key)`, which compares NaN and
/// truncated datetimes the way the stores do.
fn keyed(facts: &[Fact]) -> Vec<(String, String, String)> {
    facts
        .iter()
        .map(|fact| {
            (
                fact.entity.clone(),
                fact.attribute.clone(),
                index_key(&fact.value).expect("key"),
            )
        })
        .collect()
}

fn expected(facts: &[Fact], pattern: &Pattern) -> Vec<(String, String, String)> {
    let matched: Vec<Fact> = facts
        .iter()
        .filter(|fact| pattern.matches(fact))
        .cloned()
        .collect();
    keyed(&matched)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Decoding an encoded value gives the value back.
    #[test]
    fn codec_round_trip(value in scalar()) {
        let (tag, text) = encode(&value).expect("encode");
        prop_assert_eq!(decode(tag, &text).expect("decode"), value);
    }

    /// Equal values share an index key whatever their decimal scale.
    #[test]
    fn decimal_index_key_ignores_scale(m in -1_000_000i64..1_000_000, extra in 0u32..6) {
        let plain = Decimal::new(m, 2);
        let mut scaled = plain;
        scaled.rescale(2 + extra);
        prop_assert_eq!(
            index_key(&Value::Decimal(plain)).expect("key"),
            index_key(&Value::Decimal(scaled)).expect("key")
        );
    }

    /// Undigesting the facts of a digest rebuilds the input.
    #[test]
    fn digest_then_undigest_is_identity(input in data()) {
        let facts = digested(&input, sequential_ids()).expect("digest");
        match &input {
            Data::Scalar(_) => prop_assert!(facts.is_empty()),
            _ => prop_assert_eq!(undigested(&facts).expect("undigest"), Some(input.clone())),
        }
    }

    /// The in-memory store answers every pattern like a linear filter.
    #[test]
    fn memory_matching_is_a_filter(facts in facts(), pattern in pattern()) {
        let mut store = MemoryFactStore::new(sequential_ids());
        store.add(&facts).expect("add");
        prop_assert_eq!(keyed(&store.matching(&pattern).expect("matching")), expected(&facts, &pattern));
    }

    /// Removing every fact a pattern matches leaves exactly the rest.
    #[test]
    fn memory_delete_leaves_the_rest(facts in facts(), pattern in pattern()) {
        let mut store = MemoryFactStore::new(sequential_ids());
        store.add(&facts).expect("add");
        let doomed = store.matching(&pattern).expect("matching");
        store.remove(&doomed).expect("remove");
        let rest: Vec<Fact> = facts.iter().filter(|f| !pattern.matches(f)).cloned().collect();
        prop_assert_eq!(keyed(&store.facts().expect("facts")), keyed(&rest));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The redb store answers every pattern like a linear filter.
    #[test]
    fn redb_matching_is_a_filter(facts in facts(), pattern in pattern()) {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut store = RedbFactStore::open(temp.path(), sequential_ids()).expect("open");
        store.add(&facts).expect("add");
        prop_assert_eq!(keyed(&store.matching(&pattern).expect("matching")), expected(&facts, &pattern));
        prop_assert_eq!(store.len().expect("len"), facts.len());
    }
}
