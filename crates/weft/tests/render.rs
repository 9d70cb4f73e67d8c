//! End-to-end rendering: expressions, statements, policies, hooks.

use serde_json::json;
use weft::{Environment, Syntax, Template, UndefinedBehavior, Value, WeftError};

fn render(source: &str, context: serde_json::Value) -> String {
    let env = Environment::new();
    let template = env.from_string(source, None, None).unwrap();
    template.render(context).unwrap()
}

fn registered_env() -> Environment {
    let mut env = Environment::new();
    env.add_filter("upper", |value, _args| {
        Ok(Value::from(value.to_string().to_uppercase()))
    });
    env.add_filter("join", |value, args| {
        let sep = args
            .first()
            .map(|arg| arg.to_string())
            .unwrap_or_default();
        let items = value.as_seq().unwrap_or(&[]);
        let joined = items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(&sep);
        Ok(Value::from(joined))
    });
    env.add_filter("default", |value, args| {
        if value.is_undefined() {
            Ok(args.first().cloned().unwrap_or(Value::None))
        } else {
            Ok(value)
        }
    });
    env.add_test("odd", |value, _args| {
        Ok(value.as_i64().is_some_and(|n| n % 2 != 0))
    });
    env.add_test("divisibleby", |value, args| {
        let (Some(n), Some(d)) = (value.as_i64(), args.first().and_then(Value::as_i64)) else {
            return Ok(false);
        };
        Ok(d != 0 && n % d == 0)
    });
    env
}

// ============================================================================
// Text and expressions
// ============================================================================

#[test]
fn test_literal_template_renders_byte_identical() {
    let text = "no tags here, just text\nwith a second line";
    assert_eq!(render(text, json!({})), text);
}

#[test]
fn test_literal_template_is_a_single_fragment() {
    let env = Environment::new();
    let template = env.from_string("only text", None, None).unwrap();
    let fragments: Vec<_> = template
        .generate(())
        .unwrap()
        .map(|fragment| fragment.unwrap())
        .collect();
    assert_eq!(fragments, vec!["only text"]);
}

#[test]
fn test_variable_substitution() {
    assert_eq!(
        render("Hello {{ name }}!", json!({ "name": "Ada" })),
        "Hello Ada!"
    );
}

#[test]
fn test_attribute_and_subscript_paths() {
    let context = json!({
        "user": { "posts": [ { "title": "first" }, { "title": "second" } ] }
    });
    assert_eq!(
        render("{{ user.posts[1].title }}", context),
        "second"
    );
}

#[test]
fn test_negative_subscript_counts_from_the_end() {
    assert_eq!(
        render("{{ items[-1] }}", json!({ "items": [1, 2, 3] })),
        "3"
    );
}

#[test]
fn test_arithmetic_follows_precedence() {
    assert_eq!(render("{{ 1 + 2 * 3 }}", json!({})), "7");
    assert_eq!(render("{{ (1 + 2) * 3 }}", json!({})), "9");
    assert_eq!(render("{{ 7 // 2 }}-{{ 7 % 2 }}-{{ 7 / 2 }}", json!({})), "3-1-3.5");
}

#[test]
fn test_arithmetic_without_the_optimizer() {
    let mut env = Environment::new();
    env.set_optimized(false);
    let template = env.from_string("{{ 1 + 2 * 3 }}", None, None).unwrap();
    assert_eq!(template.render(()).unwrap(), "7");
}

#[test]
fn test_float_output_keeps_a_decimal() {
    assert_eq!(render("{{ 2.0 }}", json!({})), "2.0");
    assert_eq!(render("{{ half }}", json!({ "half": 0.5 })), "0.5");
}

#[test]
fn test_none_and_bools_render_in_template_form() {
    assert_eq!(
        render("{{ a }}/{{ b }}/{{ c }}", json!({ "a": null, "b": true, "c": false })),
        "none/true/false"
    );
}

#[test]
fn test_string_concatenation_with_plus() {
    assert_eq!(
        render("{{ first + ' ' + last }}", json!({ "first": "Ada", "last": "Lovelace" })),
        "Ada Lovelace"
    );
}

#[test]
fn test_comments_produce_no_output() {
    assert_eq!(render("a{# ignored #}b", json!({})), "ab");
}

#[test]
fn test_short_circuit_skips_the_failing_side() {
    // The right side is not callable, but it must never be evaluated.
    assert_eq!(render("{{ false and boom() }}", json!({})), "false");
    assert_eq!(render("{{ 'kept' or boom() }}", json!({})), "kept");
}

#[test]
fn test_comparisons_and_logic() {
    assert_eq!(render("{{ 1 < 2 }}", json!({})), "true");
    assert_eq!(render("{{ 1 == 1.0 }}", json!({})), "true");
    assert_eq!(render("{{ not (1 > 2) }}", json!({})), "true");
}

// ============================================================================
// Statements
// ============================================================================

#[test]
fn test_if_elif_else_chains() {
    let source = "{% if n == 1 %}one{% elif n == 2 %}two{% else %}many{% endif %}";
    assert_eq!(render(source, json!({ "n": 1 })), "one");
    assert_eq!(render(source, json!({ "n": 2 })), "two");
    assert_eq!(render(source, json!({ "n": 5 })), "many");
}

#[test]
fn test_truthiness_of_empty_values() {
    let source = "{% if value %}yes{% else %}no{% endif %}";
    assert_eq!(render(source, json!({ "value": [] })), "no");
    assert_eq!(render(source, json!({ "value": "" })), "no");
    assert_eq!(render(source, json!({ "value": 0 })), "no");
    assert_eq!(render(source, json!({ "value": [0] })), "yes");
}

#[test]
fn test_for_loop_renders_each_item() {
    assert_eq!(
        render(
            "{% for item in items %}[{{ item }}]{% endfor %}",
            json!({ "items": ["a", "b", "c"] })
        ),
        "[a][b][c]"
    );
}

#[test]
fn test_loop_counters_and_boundaries() {
    let source = "{% for x in xs %}{{ loop.index }}:{{ x }}{% if not loop.last %},{% endif %}{% endfor %}";
    assert_eq!(
        render(source, json!({ "xs": ["a", "b", "c"] })),
        "1:a,2:b,3:c"
    );
}

#[test]
fn test_loop_reverse_counters() {
    let source = "{% for x in xs %}{{ loop.revindex }}{{ loop.revindex0 }}{% endfor %}";
    assert_eq!(render(source, json!({ "xs": [0, 0, 0] })), "322110");
}

#[test]
fn test_loop_first_and_length() {
    let source = "{% for x in xs %}{% if loop.first %}({{ loop.length }}) {% endif %}{{ x }}{% endfor %}";
    assert_eq!(render(source, json!({ "xs": [7, 8] })), "(2) 78");
}

#[test]
fn test_nested_loops_shadow_and_restore() {
    let source = "{% for x in outer %}{% for x in inner %}{{ x }}{% endfor %}{{ x }}{% endfor %}";
    let context = json!({ "outer": ["A", "B"], "inner": ["1", "2"] });
    assert_eq!(render(source, context), "12A12B");
}

#[test]
fn test_loop_variable_does_not_leak() {
    let source = "{% for x in xs %}{{ x }}{% endfor %}>{{ x }}<";
    assert_eq!(render(source, json!({ "xs": [1] })), "1><");
}

#[test]
fn test_loop_helper_outside_a_loop_is_undefined() {
    assert_eq!(render("[{{ loop.index }}]", json!({})), "[]");
}

#[test]
fn test_iterating_a_string_yields_characters() {
    assert_eq!(
        render("{% for c in word %}{{ c }}.{% endfor %}", json!({ "word": "abc" })),
        "a.b.c."
    );
}

#[test]
fn test_iterating_a_map_yields_sorted_keys() {
    assert_eq!(
        render(
            "{% for key in config %}{{ key }};{% endfor %}",
            json!({ "config": { "b": 1, "a": 2, "c": 3 } })
        ),
        "a;b;c;"
    );
}

#[test]
fn test_iterating_a_number_is_an_error() {
    let env = Environment::new();
    let template = env
        .from_string("{% for x in n %}{{ x }}{% endfor %}", None, None)
        .unwrap();
    let err = template.render(json!({ "n": 3 })).unwrap_err();
    assert!(matches!(err, WeftError::InvalidOperation(_)));
    assert!(err.to_string().contains("not iterable"));
}

#[test]
fn test_empty_iterable_skips_the_body() {
    assert_eq!(
        render("a{% for x in xs %}{{ x }}{% endfor %}b", json!({ "xs": [] })),
        "ab"
    );
}

// ============================================================================
// Filters and tests
// ============================================================================

#[test]
fn test_filters_apply_and_chain() {
    let env = registered_env();
    let template = env
        .from_string("{{ names|join(', ')|upper }}", None, None)
        .unwrap();
    let rendered = template
        .render(json!({ "names": ["ada", "grace"] }))
        .unwrap();
    assert_eq!(rendered, "ADA, GRACE");
}

#[test]
fn test_filter_on_undefined_can_rescue_it() {
    let env = registered_env();
    let template = env
        .from_string("{{ missing|default('fallback') }}", None, None)
        .unwrap();
    assert_eq!(template.render(()).unwrap(), "fallback");
}

#[test]
fn test_tests_with_arguments_and_negation() {
    let env = registered_env();
    let template = env
        .from_string(
            "{% if n is divisibleby(3) %}fizz{% endif %}{% if n is not odd %}even{% endif %}",
            None,
            None,
        )
        .unwrap();
    assert_eq!(template.render(json!({ "n": 6 })).unwrap(), "fizzeven");
    assert_eq!(template.render(json!({ "n": 9 })).unwrap(), "fizz");
}

#[test]
fn test_unknown_filter_fails_at_render_not_compile() {
    let mut env = Environment::new();
    {
        // Compilation accepts the name; the lookup failure is deferred to
        // the expression actually running.
        let template = env.from_string("{{ x|upper }}", None, None).unwrap();
        let err = template.render(json!({ "x": "a" })).unwrap_err();
        assert!(matches!(err, WeftError::UnknownFilter { ref name } if name == "upper"));
    }
    env.add_filter("upper", |value, _args| {
        Ok(Value::from(value.to_string().to_uppercase()))
    });
    let template = env.from_string("{{ x|upper }}", None, None).unwrap();
    assert_eq!(template.render(json!({ "x": "a" })).unwrap(), "A");
}

#[test]
fn test_unknown_test_fails_at_render() {
    let env = Environment::new();
    let template = env
        .from_string("{% if 1 is odd %}x{% endif %}", None, None)
        .unwrap();
    let err = template.render(()).unwrap_err();
    assert!(matches!(err, WeftError::UnknownTest { ref name } if name == "odd"));
}

#[test]
fn test_unreached_branch_never_runs_its_filter() {
    let env = Environment::new();
    let template = env
        .from_string("{% if false %}{{ x|nope }}{% endif %}ok", None, None)
        .unwrap();
    assert_eq!(template.render(()).unwrap(), "ok");
}

// ============================================================================
// Undefined policies
// ============================================================================

#[test]
fn test_lenient_undefined_renders_empty() {
    assert_eq!(render("x[{{ missing }}]y", json!({})), "x[]y");
}

#[test]
fn test_strict_undefined_fails_on_output() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let template = env.from_string("x{{ missing }}", None, None).unwrap();
    let err = template.render(()).unwrap_err();
    assert!(matches!(err, WeftError::Undefined { ref key } if key == "missing"));
}

#[test]
fn test_strict_undefined_fails_in_conditions_and_loops() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    let template = env
        .from_string("{% if missing %}x{% endif %}", None, None)
        .unwrap();
    assert!(matches!(
        template.render(()).unwrap_err(),
        WeftError::Undefined { .. }
    ));

    let template = env
        .from_string("{% for x in missing %}x{% endfor %}", None, None)
        .unwrap();
    assert!(matches!(
        template.render(()).unwrap_err(),
        WeftError::Undefined { .. }
    ));

    let template = env
        .from_string("{% if missing == 1 %}x{% endif %}", None, None)
        .unwrap();
    assert!(matches!(
        template.render(()).unwrap_err(),
        WeftError::Undefined { .. }
    ));
}

#[test]
fn test_debug_undefined_marks_the_hole() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Debug);
    let template = env.from_string("[{{ missing }}]", None, None).unwrap();
    assert_eq!(template.render(()).unwrap(), "[{{ missing }}]");
}

#[test]
fn test_debug_undefined_marks_failed_element_lookups() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Debug);
    let template = env.from_string("[{{ user.email }}]", None, None).unwrap();
    let rendered = template.render(json!({ "user": {} })).unwrap();
    assert_eq!(rendered, "[{{ no such element: email }}]");
}

#[test]
fn test_lenient_undefined_iterates_as_empty() {
    assert_eq!(
        render("a{% for x in missing %}{{ x }}{% endfor %}b", json!({})),
        "ab"
    );
}

#[test]
fn test_arithmetic_on_undefined_errors_under_every_policy() {
    for behavior in [
        UndefinedBehavior::Lenient,
        UndefinedBehavior::Strict,
        UndefinedBehavior::Debug,
    ] {
        let mut env = Environment::new();
        env.set_undefined_behavior(behavior);
        let template = env.from_string("{{ missing + 1 }}", None, None).unwrap();
        assert!(template.render(()).is_err(), "policy {behavior:?} let the add through");
    }
}

#[test]
fn test_undefined_equality_under_lenient() {
    assert_eq!(render("{{ missing == also_missing }}", json!({})), "true");
    assert_eq!(render("{{ missing == '' }}", json!({})), "false");
    assert_eq!(render("{{ missing == none }}", json!({})), "false");
}

// ============================================================================
// Laziness
// ============================================================================

#[test]
fn test_output_before_an_error_is_delivered() {
    let env = Environment::new();
    let template = env
        .from_string("before-{{ 1 // 0 }}-after", None, None)
        .unwrap();
    let mut fragments = template.generate(()).unwrap();
    assert_eq!(fragments.next().unwrap().unwrap(), "before-");
    assert!(fragments.next().unwrap().is_err());
    // The failed render is exhausted, not restarted.
    assert!(fragments.next().is_none());
}

#[test]
fn test_abandoned_render_costs_nothing_more() {
    let env = Environment::new();
    let template = env
        .from_string("head{{ boom() }}tail", None, None)
        .unwrap();
    let mut fragments = template.generate(()).unwrap();
    // Only the first fragment is pulled; the failing expression after it
    // never runs because nobody asks for it.
    assert_eq!(fragments.next().unwrap().unwrap(), "head");
    drop(fragments);
}

#[test]
fn test_renders_are_independent() {
    let env = Environment::new();
    let template = env.from_string("{{ n }}", None, None).unwrap();
    let first = template.render(json!({ "n": 1 })).unwrap();
    let second = template.render(json!({ "n": 2 })).unwrap();
    assert_eq!((first.as_str(), second.as_str()), ("1", "2"));
}

#[test]
fn test_two_threads_render_the_same_template() {
    let mut env = Environment::new();
    env.add_filter("upper", |value, _args| {
        Ok(Value::from(value.to_string().to_uppercase()))
    });
    let template = env
        .from_string("{{ who|upper }} says {{ n }}", None, None)
        .unwrap();
    std::thread::scope(|scope| {
        let a = scope.spawn(|| template.render(json!({ "who": "ada", "n": 1 })).unwrap());
        let b = scope.spawn(|| template.render(json!({ "who": "bob", "n": 2 })).unwrap());
        assert_eq!(a.join().unwrap(), "ADA says 1");
        assert_eq!(b.join().unwrap(), "BOB says 2");
    });
}

#[test]
fn test_shared_types_are_send_and_sync() {
    fn assert_shareable<T: Send + Sync>() {}
    assert_shareable::<Environment>();
    assert_shareable::<Template<'static>>();
}

// ============================================================================
// Configurable grammar
// ============================================================================

#[test]
fn test_custom_delimiters() {
    let mut env = Environment::new();
    env.set_syntax(Syntax {
        block_start: "<%".to_string(),
        block_end: "%>".to_string(),
        variable_start: "${".to_string(),
        variable_end: "}".to_string(),
        comment_start: "<#".to_string(),
        comment_end: "#>".to_string(),
        ..Syntax::default()
    });
    let template = env
        .from_string("<% if ok %>${ name }<# hidden #><% endif %>", None, None)
        .unwrap();
    let rendered = template
        .render(json!({ "ok": true, "name": "Ada" }))
        .unwrap();
    assert_eq!(rendered, "Ada");
    // The default delimiters are plain text under this syntax.
    let template = env.from_string("{{ name }}", None, None).unwrap();
    assert_eq!(template.render(json!({ "name": "x" })).unwrap(), "{{ name }}");
}

#[test]
fn test_line_statements() {
    let mut env = Environment::new();
    env.set_syntax(Syntax {
        line_statement_prefix: Some("#".to_string()),
        ..Syntax::default()
    });
    let source = "# for item in items\n* {{ item }}\n# endfor";
    let template = env.from_string(source, None, None).unwrap();
    let rendered = template.render(json!({ "items": ["a", "b"] })).unwrap();
    assert_eq!(rendered, "\n* a\n\n* b\n");
}

#[test]
fn test_trim_blocks_removes_the_newline_after_tags() {
    let mut env = Environment::new();
    env.set_syntax(Syntax {
        trim_blocks: true,
        ..Syntax::default()
    });
    let source = "{% if ok %}\nline\n{% endif %}\n";
    let template = env.from_string(source, None, None).unwrap();
    assert_eq!(template.render(json!({ "ok": true })).unwrap(), "line\n");
}

// ============================================================================
// Hooks
// ============================================================================

#[test]
fn test_finalize_rewrites_every_emitted_value() {
    let mut env = Environment::new();
    env.set_finalize(|value| format!("<{value}>"));
    let template = env.from_string("a{{ 1 }}b{{ 'x' }}", None, None).unwrap();
    // Literal text is untouched; only expression output passes through.
    assert_eq!(template.render(()).unwrap(), "a<1>b<x>");
}

#[test]
fn test_finalize_runs_after_the_undefined_policy() {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Debug);
    env.set_finalize(|value| format!("<{value}>"));
    let template = env.from_string("{{ missing }}", None, None).unwrap();
    assert_eq!(template.render(()).unwrap(), "<{{ missing }}>");
}

#[test]
fn test_template_globals_resolve_in_expressions() {
    let mut env = Environment::new();
    env.add_global("base_url", "https://example.org");
    let template = env
        .from_string("{{ base_url }}/{{ page }}", None, None)
        .unwrap();
    assert_eq!(
        template.render(json!({ "page": "a" })).unwrap(),
        "https://example.org/a"
    );
}
