//! Property: a value stored as a direct global `k` comes back from
//! `{{k}}` (whole-string interpolation) with its type preserved.

use proptest::prelude::*;
use serde_json::{Value, json};
use webpilot_expression::{ResolveContext, Template};

/// Arbitrary JSON values, three levels deep.
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 _.-]{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_][a-z0-9_]{0,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn whole_string_interpolation_preserves_type(value in arb_value()) {
        let mut ctx = ResolveContext::new();
        ctx.set_global("k", value.clone());

        let rendered = Template::parse("{{k}}").unwrap().render(&ctx).unwrap();
        prop_assert_eq!(rendered, value);
    }

    #[test]
    fn mixed_interpolation_always_yields_a_string(value in arb_value()) {
        let mut ctx = ResolveContext::new();
        ctx.set_global("k", value);

        let rendered = Template::parse("v={{k}}").unwrap().render(&ctx).unwrap();
        prop_assert!(rendered.is_string());
    }
}
