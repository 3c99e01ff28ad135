//! Effect inference rules: known effects, try/except modelling, scoping,
//! call resolution, and the unresolved-call policy.

use std::sync::atomic::AtomicBool;

use attest_check::{
    analyze_module, analyze_module_with_cancel, analyze_modules, AnalysisConfig, ModuleReport,
    UnresolvedPolicy,
};
use attest_core::ast::{ClassDecl, Expr, FunctionDecl, Handler, Keyword, ModuleAst, Stmt, WithItem};
use attest_core::{CallTarget, DiagnosticCode, FactSummary, IoChannel, Span};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn at(line: u32) -> Span {
    Span::new(line, 0)
}

fn contract(word: &str, args: Vec<Expr>, line: u32) -> Expr {
    Expr::call_external(&format!("deal.{word}"), args, Span::new(line, 1))
}

fn bare(word: &str, line: u32) -> Expr {
    Expr::dotted(&format!("deal.{word}"), Span::new(line, 1))
}

fn module_with(body: Vec<Stmt>) -> ModuleAst {
    ModuleAst::new("m").with_function(FunctionDecl::new("f", at(1)).with_params(&["x"]).with_body(body))
}

fn decorated(decorators: Vec<Expr>, body: Vec<Stmt>) -> ModuleAst {
    let mut func = FunctionDecl::new("f", at(2)).with_params(&["x"]).with_body(body);
    func.decorators = decorators;
    ModuleAst::new("m").with_function(func)
}

fn run(module: &ModuleAst) -> ModuleReport {
    run_with(module, &AnalysisConfig::default())
}

fn run_with(module: &ModuleAst, config: &AnalysisConfig) -> ModuleReport {
    let report = analyze_module(module, config);
    assert!(report.failure.is_none(), "unexpected failure: {:?}", report.failure);
    report
}

fn fact_of(report: &ModuleReport, function: &str) -> FactSummary {
    report
        .facts
        .iter()
        .find(|f| f.function == function)
        .map(|f| f.fact.clone())
        .unwrap_or_else(|| panic!("no fact for {function}"))
}

fn call(path: &str, line: u32) -> Stmt {
    Stmt::expr(Expr::call_external(path, vec![], at(line)))
}

fn dynamic_call(line: u32) -> Stmt {
    Stmt::expr(Expr::call(
        Expr::name("callback", at(line)),
        CallTarget::Dynamic,
        vec![],
        at(line),
    ))
}

// ---------------------------------------------------------------------------
// Known effects
// ---------------------------------------------------------------------------

#[test]
fn print_is_stdout_io() {
    let report = run(&module_with(vec![call("print", 2)]));
    let fact = fact_of(&report, "f");
    assert!(fact.has_io);
    assert_eq!(fact.io, vec![IoChannel::Stdout]);
    assert!(fact.raises.is_empty());
}

#[test]
fn open_mode_decides_channel() {
    let open = |mode: &str| {
        Stmt::expr(Expr::call_external(
            "open",
            vec![Expr::name("x", at(2)), Expr::str(mode, at(2))],
            at(2),
        ))
    };
    assert_eq!(fact_of(&run(&module_with(vec![open("w")])), "f").io, vec![IoChannel::Write]);
    assert_eq!(fact_of(&run(&module_with(vec![open("r")])), "f").io, vec![IoChannel::Read]);

    let mut keyword_mode = Expr::call_external("open", vec![Expr::name("x", at(2))], at(2));
    if let Expr::Call { keywords, .. } = &mut keyword_mode {
        keywords.push(Keyword {
            name: "mode".into(),
            value: Expr::str("a", at(2)),
        });
    }
    let report = run(&module_with(vec![Stmt::expr(keyword_mode)]));
    assert_eq!(fact_of(&report, "f").io, vec![IoChannel::Write]);
}

#[test]
fn clock_and_environment_are_nondeterministic() {
    let report = run(&module_with(vec![call("time.time", 2)]));
    assert!(!fact_of(&report, "f").is_deterministic);

    let environ = Stmt::ret(
        Some(Expr::Subscript {
            value: Box::new(Expr::dotted("os.environ", at(2))),
            index: Box::new(Expr::str("HOME", at(2))),
            span: at(2),
        }),
        at(2),
    );
    let report = run(&module_with(vec![environ]));
    let fact = fact_of(&report, "f");
    assert!(!fact.is_deterministic);
    assert!(!fact.has_io);
}

#[test]
fn sys_exit_raises_system_exit() {
    let report = run(&module_with(vec![call("sys.exit", 2)]));
    assert_eq!(fact_of(&report, "f").raises, vec!["SystemExit"]);
}

#[test]
fn pure_builtins_contribute_nothing() {
    let body = vec![Stmt::ret(
        Some(Expr::call_external("len", vec![Expr::name("x", at(2))], at(2))),
        at(2),
    )];
    let report = run(&module_with(body));
    assert!(fact_of(&report, "f").is_pure);
}

#[test]
fn configured_effects_are_applied() {
    let config = AnalysisConfig::from_toml_str(
        r#"
        [[effects]]
        name = "payments.charge"
        io = ["network"]
        raises = ["PaymentDeclined"]
        "#,
    )
    .unwrap();
    let report = run_with(&module_with(vec![call("payments.charge", 2)]), &config);
    let fact = fact_of(&report, "f");
    assert_eq!(fact.io, vec![IoChannel::Network]);
    assert_eq!(fact.raises, vec!["PaymentDeclined"]);
}

#[test]
fn assert_and_import_statements() {
    let body = vec![
        Stmt::Assert {
            test: Expr::name("x", at(2)),
            msg: None,
            span: at(2),
        },
        Stmt::Import {
            names: vec!["json".into()],
            span: at(3),
        },
    ];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert_eq!(fact.raises, vec!["AssertionError"]);
    assert_eq!(fact.io, vec![IoChannel::Import]);
}

// ---------------------------------------------------------------------------
// Try / except
// ---------------------------------------------------------------------------

#[test]
fn handler_containment_is_subtype_aware() {
    let body = vec![Stmt::try_(
        vec![Stmt::raise_new("KeyError", at(3)), Stmt::raise_new("TypeError", at(4))],
        vec![Handler::catching(&["LookupError"], vec![Stmt::Pass], at(5))],
        vec![],
    )];
    // KeyError is caught; TypeError follows it in the body and still escapes.
    let fact = fact_of(&run(&module_with(body)), "f");
    assert_eq!(fact.raises, vec!["TypeError"]);

    let body = vec![Stmt::try_(
        vec![
            Stmt::if_(Expr::name("x", at(2)), vec![Stmt::raise_new("KeyError", at(3))], vec![]),
            Stmt::raise_new("TypeError", at(4)),
        ],
        vec![Handler::catching(&["LookupError"], vec![Stmt::Pass], at(5))],
        vec![],
    )];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert_eq!(fact.raises, vec!["TypeError"]);
}

#[test]
fn non_raise_effects_of_try_body_propagate() {
    let body = vec![Stmt::try_(
        vec![call("print", 3), Stmt::raise_new("ValueError", at(4))],
        vec![Handler::catching(&["ValueError"], vec![Stmt::Pass], at(5))],
        vec![],
    )];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert!(fact.raises.is_empty());
    assert_eq!(fact.io, vec![IoChannel::Stdout]);
}

#[test]
fn else_and_finally_are_not_guarded() {
    let body = vec![Stmt::Try {
        body: vec![Stmt::Pass],
        handlers: vec![Handler::catching(&["ValueError"], vec![Stmt::Pass], at(4))],
        orelse: vec![Stmt::raise_new("ValueError", at(6))],
        finalbody: vec![Stmt::raise_new("OSError", at(8))],
    }];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert_eq!(fact.raises, vec!["OSError", "ValueError"]);
}

#[test]
fn reraise_of_bound_name() {
    let handler = Handler {
        kinds: vec!["KeyError".into()],
        name: Some("err".into()),
        body: vec![Stmt::Raise {
            exc: Some(Expr::name("err", at(5))),
            cause: None,
            span: at(5),
        }],
        span: at(4),
    };
    let body = vec![Stmt::try_(vec![Stmt::raise_new("KeyError", at(3))], vec![handler], vec![])];
    assert_eq!(fact_of(&run(&module_with(body)), "f").raises, vec!["KeyError"]);
}

#[test]
fn reraise_without_match_uses_filter_kinds() {
    let body = vec![Stmt::try_(
        vec![Stmt::Pass],
        vec![Handler::catching(&["ValueError"], vec![Stmt::reraise(at(4))], at(3))],
        vec![],
    )];
    assert_eq!(fact_of(&run(&module_with(body)), "f").raises, vec!["ValueError"]);
}

#[test]
fn bare_reraise_outside_handler_is_runtime_error() {
    let report = run(&module_with(vec![Stmt::reraise(at(2))]));
    assert_eq!(fact_of(&report, "f").raises, vec!["RuntimeError"]);
}

#[test]
fn catch_all_contains_unknown_raises() {
    let body = vec![Stmt::try_(
        vec![dynamic_call(3)],
        vec![Handler::catch_all(vec![Stmt::Pass], at(4))],
        vec![],
    )];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert!(!fact.unknown_raises);

    let body = vec![Stmt::try_(
        vec![dynamic_call(3)],
        vec![Handler::catching(&["ValueError"], vec![Stmt::Pass], at(4))],
        vec![],
    )];
    assert!(fact_of(&run(&module_with(body)), "f").unknown_raises);
}

#[test]
fn statements_after_exit_keep_their_effects() {
    let body = vec![
        Stmt::ret(Some(Expr::int(1, at(2))), at(2)),
        Stmt::raise_new("ValueError", at(3)),
    ];
    assert_eq!(fact_of(&run(&module_with(body)), "f").raises, vec!["ValueError"]);

    let body = vec![
        Stmt::if_(
            Expr::name("x", at(2)),
            vec![Stmt::ret(None, at(3))],
            vec![Stmt::raise_new("KeyError", at(5))],
        ),
        call("print", 6),
    ];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert_eq!(fact.raises, vec!["KeyError"]);
    assert_eq!(fact.io, vec![IoChannel::Stdout]);

    // An unconditional raise in front keeps the later one.
    let body = vec![Stmt::raise_new("KeyError", at(2)), Stmt::raise_new("IndexError", at(3))];
    assert_eq!(fact_of(&run(&module_with(body)), "f").raises, vec!["IndexError", "KeyError"]);

    // An exiting try body does not hide the else clause.
    let body = vec![Stmt::Try {
        body: vec![Stmt::ret(None, at(3))],
        handlers: vec![Handler::catching(&["ValueError"], vec![Stmt::Pass], at(4))],
        orelse: vec![call("print", 6)],
        finalbody: vec![],
    }];
    assert!(fact_of(&run(&module_with(body)), "f").has_io);
}

#[test]
fn with_block_effects_are_collected() {
    let body = vec![Stmt::With {
        items: vec![WithItem {
            context: Expr::call_external("open", vec![Expr::name("x", at(2))], at(2)),
            alias: Some("fh".into()),
        }],
        body: vec![Stmt::ret(
            Some(Expr::call(
                Expr::Attribute {
                    value: Box::new(Expr::name("fh", at(3))),
                    attr: "read".into(),
                    resolved: None,
                    span: at(3),
                },
                CallTarget::Dynamic,
                vec![],
                at(3),
            )),
            at(3),
        )],
    }];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert_eq!(fact.io, vec![IoChannel::Read]);
    assert!(fact.unknown_raises);
}

#[test]
fn statements_after_suppressing_with_are_reachable() {
    let body = vec![
        Stmt::With {
            items: vec![WithItem {
                context: Expr::call_external(
                    "contextlib.suppress",
                    vec![Expr::name("ValueError", at(2))],
                    at(2),
                ),
                alias: None,
            }],
            body: vec![Stmt::raise_new("ValueError", at(3))],
        },
        call("print", 4),
    ];
    let fact = fact_of(&run(&module_with(body)), "f");
    assert!(fact.has_io);
    assert_eq!(fact.io, vec![IoChannel::Stdout]);
    assert!(fact.raises.contains(&"ValueError".to_string()));
}

// ---------------------------------------------------------------------------
// Scoping and globals
// ---------------------------------------------------------------------------

#[test]
fn parameters_and_locals_shadow_globals() {
    let module = ModuleAst::new("m")
        .with_binding("CACHE", true, at(1))
        .with_function(
            FunctionDecl::new("f", at(2))
                .with_params(&["CACHE"])
                .with_body(vec![Stmt::ret(Some(Expr::name("CACHE", at(3))), at(3))]),
        )
        .with_function(FunctionDecl::new("g", at(5)).with_body(vec![
            Stmt::assign("CACHE", Expr::int(0, at(6)), at(6)),
            Stmt::ret(Some(Expr::name("CACHE", at(7))), at(7)),
        ]));
    let report = run(&module);
    assert!(!fact_of(&report, "f").has_global_access);
    assert!(!fact_of(&report, "g").has_global_access);
}

#[test]
fn global_declaration_is_global_access() {
    let module = ModuleAst::new("m")
        .with_binding("COUNT", true, at(1))
        .with_function(FunctionDecl::new("bump", at(2)).with_body(vec![
            Stmt::Global {
                names: vec!["COUNT".into()],
                span: at(3),
            },
            Stmt::AugAssign {
                target: Expr::name("COUNT", at(4)),
                value: Expr::int(1, at(4)),
                span: at(4),
            },
        ]));
    let report = run(&module);
    assert!(fact_of(&report, "bump").has_global_access);
}

#[test]
fn mutating_global_container_is_global_access() {
    let append = Expr::call(
        Expr::Attribute {
            value: Box::new(Expr::name("SEEN", at(3))),
            attr: "append".into(),
            resolved: None,
            span: at(3),
        },
        CallTarget::Dynamic,
        vec![Expr::name("x", at(3))],
        at(3),
    );
    let module = ModuleAst::new("m")
        .with_binding("SEEN", true, at(1))
        .with_function(
            FunctionDecl::new("f", at(2))
                .with_params(&["x"])
                .with_body(vec![Stmt::expr(append)]),
        );
    assert!(fact_of(&run(&module), "f").has_global_access);
}

#[test]
fn lambda_parameters_are_scoped() {
    let shadowed = Expr::lambda(&["CACHE"], Expr::name("CACHE", at(3)), at(3));
    let captured = Expr::lambda(&["key"], Expr::name("CACHE", at(7)), at(7));
    let module = ModuleAst::new("m")
        .with_binding("CACHE", true, at(1))
        .with_function(FunctionDecl::new("f", at(2)).with_body(vec![
            Stmt::assign("get", shadowed, at(3)),
            Stmt::ret(Some(Expr::name("get", at(4))), at(4)),
        ]))
        .with_function(FunctionDecl::new("g", at(6)).with_body(vec![
            Stmt::assign("get", captured, at(7)),
            Stmt::ret(Some(Expr::name("get", at(8))), at(8)),
        ]));
    let report = run(&module);
    assert!(!fact_of(&report, "f").has_global_access);
    assert!(fact_of(&report, "g").has_global_access);
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

#[test]
fn callee_raises_are_relocated_to_call_site() {
    let module = ModuleAst::new("m")
        .with_function(
            FunctionDecl::new("outer", at(2))
                .with_decorator(contract("raises", vec![Expr::name("ValueError", at(1))], 1))
                .with_body(vec![Stmt::expr(Expr::call_local("inner", vec![], Span::new(3, 4)))]),
        )
        .with_function(
            FunctionDecl::new("inner", at(5)).with_body(vec![Stmt::raise_new("KeyError", at(6))]),
        );
    let report = run(&module);
    let undeclared: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::UndeclaredException)
        .collect();
    assert_eq!(undeclared.len(), 1);
    let d = undeclared[0];
    assert_eq!((d.line, d.column), (3, 4));
    assert_eq!(d.function, "outer");
}

#[test]
fn method_and_constructor_calls_resolve_locally() {
    let init = FunctionDecl::new("__init__", at(3))
        .with_params(&["self", "balance"])
        .with_body(vec![Stmt::if_(
            Expr::name("balance", at(4)),
            vec![Stmt::raise_new("ValueError", at(5))],
            vec![],
        )]);
    let withdraw = FunctionDecl::new("withdraw", at(7))
        .with_params(&["self", "amount"])
        .with_body(vec![Stmt::raise_new("KeyError", at(8))]);
    let account = ClassDecl {
        name: "Account".into(),
        span: at(2),
        bases: vec![],
        decorators: vec![],
        methods: vec![init, withdraw],
    };
    let open_account = FunctionDecl::new("open_account", at(10)).with_body(vec![
        Stmt::assign("acct", Expr::call_local("Account", vec![Expr::int(0, at(11))], at(11)), at(11)),
        Stmt::expr(Expr::call_local("Account.withdraw", vec![Expr::int(5, at(12))], at(12))),
    ]);
    let module = ModuleAst::new("bank").with_class(account).with_function(open_account);
    let report = run(&module);
    assert_eq!(fact_of(&report, "open_account").raises, vec!["KeyError", "ValueError"]);
    assert!(!fact_of(&report, "open_account").unknown_raises);
}

#[test]
fn module_exception_classes_join_the_hierarchy() {
    let pricing_error = ClassDecl {
        name: "PricingError".into(),
        span: at(1),
        bases: vec!["ValueError".into()],
        decorators: vec![],
        methods: vec![],
    };
    let raise = Stmt::Raise {
        exc: Some(Expr::call_local("PricingError", vec![], at(5))),
        cause: None,
        span: at(5),
    };
    let module = ModuleAst::new("shop")
        .with_class(pricing_error)
        .with_function(
            FunctionDecl::new("price", at(4))
                .with_decorator(contract("raises", vec![Expr::name("ValueError", at(3))], 3))
                .with_body(vec![raise]),
        );
    let report = run(&module);
    assert_eq!(fact_of(&report, "price").raises, vec!["PricingError"]);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

// ---------------------------------------------------------------------------
// Unresolved calls and policy
// ---------------------------------------------------------------------------

#[test]
fn unresolved_calls_set_unknown_raises_only() {
    let report = run(&module_with(vec![dynamic_call(2), call("yaml.load", 3)]));
    let fact = fact_of(&report, "f");
    assert!(fact.unknown_raises);
    assert!(fact.raises.is_empty());
    assert!(!fact.is_pure);
}

#[test]
fn unknown_raises_mask_unused_declarations() {
    let module = decorated(
        vec![contract("raises", vec![Expr::name("ValueError", at(1))], 1)],
        vec![dynamic_call(3)],
    );
    let report = run(&module);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn unused_report_can_be_disabled() {
    let module = decorated(
        vec![contract("raises", vec![Expr::name("ValueError", at(1))], 1)],
        vec![Stmt::Pass],
    );
    assert_eq!(run(&module).diagnostics.len(), 1);

    let config = AnalysisConfig {
        report_unused_raises: false,
        ..AnalysisConfig::default()
    };
    assert!(run_with(&module, &config).diagnostics.is_empty());
}

#[test]
fn safe_follows_unresolved_policy() {
    let module = decorated(vec![bare("safe", 1)], vec![dynamic_call(3)]);

    let conservative = run(&module);
    assert_eq!(conservative.diagnostics.len(), 1);
    assert_eq!(conservative.diagnostics[0].code, DiagnosticCode::ContractViolationStatic);
    assert_eq!(conservative.diagnostics[0].line, 3);

    let config = AnalysisConfig {
        unresolved_policy: UnresolvedPolicy::Permissive,
        ..AnalysisConfig::default()
    };
    assert!(run_with(&module, &config).diagnostics.is_empty());
}

#[test]
fn pure_reports_each_contradicted_property() {
    let module = decorated(
        vec![bare("pure", 1)],
        vec![
            call("print", 3),
            call("random.random", 4),
            Stmt::raise_new("ValueError", at(5)),
        ],
    );
    let report = run(&module);
    let lines: Vec<u32> = report.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![3, 4, 5]);
    assert!(report
        .diagnostics
        .iter()
        .all(|d| d.code == DiagnosticCode::ContractViolationStatic));
}

#[test]
fn has_markers_permit_channels() {
    let body = vec![call("print", 3), call("requests.get", 4)];
    let allowed = decorated(vec![contract("has", vec![Expr::str("stdout", at(1)), Expr::str("network", at(1))], 1)], body.clone());
    assert!(run(&allowed).diagnostics.is_empty());

    let partial = decorated(vec![contract("has", vec![Expr::str("stdout", at(1))], 1)], body.clone());
    let report = run(&partial);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].line, 4);
    assert!(report.diagnostics[0].message.contains("network"));

    let everything = decorated(vec![contract("has", vec![Expr::str("io", at(1))], 1)], body);
    assert!(run(&everything).diagnostics.is_empty());
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[test]
fn cancellation_aborts_module() {
    let module = decorated(
        vec![contract("pre", vec![Expr::int(1, at(1))], 1)],
        vec![Stmt::raise_new("ValueError", at(3))],
    );
    let cancel = AtomicBool::new(true);
    let report = analyze_module_with_cancel(&module, &AnalysisConfig::default(), &cancel);
    assert_eq!(report.failure.as_deref(), Some("analysis cancelled"));
    assert!(report.facts.is_empty());
    // Extraction diagnostics survive.
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].code, DiagnosticCode::MalformedContract);
}

#[test]
fn duplicate_declarations_fail_the_module() {
    let module = ModuleAst::new("dup")
        .with_function(FunctionDecl::new("f", at(1)))
        .with_function(FunctionDecl::new("f", at(3)));
    let report = analyze_module(&module, &AnalysisConfig::default());
    assert_eq!(report.failure.as_deref(), Some("duplicate declaration: 'f'"));
    assert!(report.diagnostics.is_empty());
}

#[test]
fn modules_are_reported_in_input_order() {
    let modules: Vec<ModuleAst> = (0..8)
        .map(|i| {
            let mut module = module_with(vec![call("print", 2)]);
            module.id = format!("pkg.mod{i}");
            module
        })
        .collect();
    let reports = analyze_modules(&modules, &AnalysisConfig::default());
    let ids: Vec<&str> = reports.iter().map(|r| r.module_id.as_str()).collect();
    let expected: Vec<String> = (0..8).map(|i| format!("pkg.mod{i}")).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
}
