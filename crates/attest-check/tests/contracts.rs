//! Contract predicates, contract metadata, and rendered reports.

use attest_check::extract::extract_module;
use attest_check::report::{render_text, LintMessage};
use attest_check::{analyze_module, AnalysisConfig, ModuleReport};
use attest_core::ast::{ClassDecl, Expr, FunctionDecl, ModuleAst, Stmt};
use attest_core::{ContractKind, DiagnosticCode, Payload, Span};

fn at(line: u32) -> Span {
    Span::new(line, 0)
}

fn contract(word: &str, args: Vec<Expr>, line: u32) -> Expr {
    Expr::call_external(&format!("deal.{word}"), args, Span::new(line, 1))
}

fn run(module: &ModuleAst) -> ModuleReport {
    let report = analyze_module(module, &AnalysisConfig::default());
    assert!(report.failure.is_none(), "unexpected failure: {:?}", report.failure);
    report
}

#[test]
fn printing_predicate_is_impure() {
    let noisy = Expr::lambda(
        &["x"],
        Expr::call_external("print", vec![Expr::name("x", at(1))], at(1)),
        at(1),
    );
    let module = ModuleAst::new("m").with_function(
        FunctionDecl::new("f", at(2))
            .with_params(&["x"])
            .with_decorator(contract("pre", vec![noisy], 1))
            .with_body(vec![Stmt::ret(Some(Expr::name("x", at(3))), at(3))]),
    );
    let report = run(&module);
    assert_eq!(report.diagnostics.len(), 1);
    let d = &report.diagnostics[0];
    assert_eq!(d.code, DiagnosticCode::ImpureContractExpression);
    assert_eq!((d.line, d.column), (1, 1));
    assert_eq!(d.function, "f");
    assert_eq!(d.message, "`pre` predicate performs I/O");
}

#[test]
fn named_predicate_reading_global_is_impure() {
    let module = ModuleAst::new("m")
        .with_binding("THRESHOLD", true, at(1))
        .with_function(
            FunctionDecl::new("f", at(3))
                .with_params(&["x"])
                .with_decorator(contract("post", vec![Expr::name("above", at(2))], 2)),
        )
        .with_function(
            FunctionDecl::new("above", at(5))
                .with_params(&["result"])
                .with_body(vec![Stmt::ret(
                    Some(Expr::compare(
                        Expr::name("result", at(6)),
                        Expr::name("THRESHOLD", at(6)),
                        at(6),
                    )),
                    at(6),
                )]),
        );
    let report = run(&module);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].code, DiagnosticCode::ImpureContractExpression);
    assert!(report.diagnostics[0].message.contains("global"));
}

fn negative() -> Expr {
    Expr::lambda(
        &["x"],
        Expr::compare(Expr::name("x", at(1)), Expr::int(0, at(1)), at(1)),
        at(1),
    )
}

fn grows() -> Expr {
    Expr::lambda(
        &["x", "result"],
        Expr::compare(Expr::name("result", at(2)), Expr::name("x", at(2)), at(2)),
        at(2),
    )
}

#[test]
fn reason_and_ensure_are_extracted() {
    let module = ModuleAst::new("m").with_function(
        FunctionDecl::new("f", at(3))
            .with_params(&["x"])
            .with_decorator(contract("reason", vec![Expr::name("ValueError", at(1)), negative()], 1))
            .with_decorator(contract("ensure", vec![grows()], 2))
            .with_body(vec![Stmt::ret(Some(Expr::name("x", at(4))), at(4))]),
    );
    let extraction = extract_module(&module, &AnalysisConfig::default()).unwrap();
    assert!(extraction.diagnostics.is_empty());

    let f = extraction.units.unit(extraction.units.lookup("f").unwrap()).unwrap();
    let kinds: Vec<_> = f.contracts.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![ContractKind::Reason, ContractKind::Ensure]);

    let reason = &f.contracts[0];
    match &reason.payload {
        Payload::Reason { kind, unit } => {
            assert_eq!(kind.as_str(), "ValueError");
            assert_eq!(Some(*unit), reason.predicate_unit());
        }
        other => panic!("expected a reason payload, got {:?}", other),
    }

    let names: Vec<&str> = f
        .contracts
        .iter()
        .filter_map(|c| c.predicate_unit())
        .map(|id| extraction.units.unit(id).unwrap().name.as_str())
        .collect();
    assert_eq!(names, vec!["f.<reason#0>", "f.<ensure#0>"]);
    let ensure = extraction.units.unit(f.contracts[1].predicate_unit().unwrap()).unwrap();
    assert!(ensure.is_predicate());
    assert_eq!(ensure.params, vec!["x", "result"]);

    // Pure predicates: nothing to report, and both are counted.
    let report = run(&module);
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(report.metadata[0].predicates.reason, 1);
    assert_eq!(report.metadata[0].predicates.ensure, 1);
}

#[test]
fn impure_reason_and_ensure_predicates_are_reported() {
    let noisy = Expr::lambda(
        &["x"],
        Expr::call_external("print", vec![Expr::name("x", at(1))], at(1)),
        at(1),
    );
    let random = Expr::lambda(
        &["x", "result"],
        Expr::compare(
            Expr::call_external("random.random", vec![], at(2)),
            Expr::name("result", at(2)),
            at(2),
        ),
        at(2),
    );
    let module = ModuleAst::new("m").with_function(
        FunctionDecl::new("f", at(3))
            .with_params(&["x"])
            .with_decorator(contract("reason", vec![Expr::name("ValueError", at(1)), noisy], 1))
            .with_decorator(contract("ensure", vec![random], 2))
            .with_body(vec![Stmt::ret(Some(Expr::name("x", at(4))), at(4))]),
    );
    let report = run(&module);
    let found: Vec<(DiagnosticCode, u32, &str)> = report
        .diagnostics
        .iter()
        .map(|d| (d.code, d.line, d.message.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            (DiagnosticCode::ImpureContractExpression, 1, "`reason` predicate performs I/O"),
            (DiagnosticCode::ImpureContractExpression, 2, "`ensure` predicate is not deterministic"),
        ]
    );
    assert!(report.diagnostics.iter().all(|d| d.function == "f"));
}

#[test]
fn class_invariant_predicate_is_checked() {
    let class = ClassDecl {
        name: "Wallet".into(),
        span: at(2),
        bases: vec![],
        decorators: vec![contract(
            "inv",
            vec![Expr::lambda(
                &["w"],
                Expr::call_external("random.random", vec![], at(1)),
                at(1),
            )],
            1,
        )],
        methods: vec![],
    };
    let report = run(&ModuleAst::new("m").with_class(class));
    assert_eq!(report.diagnostics.len(), 1);
    let d = &report.diagnostics[0];
    assert_eq!(d.function, "Wallet");
    assert_eq!(d.message, "`inv` predicate is not deterministic");
}

#[test]
fn pure_predicates_are_silent() {
    let positive = Expr::lambda(
        &["x"],
        Expr::compare(
            Expr::call_external("abs", vec![Expr::name("x", at(1))], at(1)),
            Expr::int(0, at(1)),
            at(1),
        ),
        at(1),
    );
    let module = ModuleAst::new("m").with_function(
        FunctionDecl::new("f", at(2))
            .with_params(&["x"])
            .with_decorator(contract("pre", vec![positive], 1)),
    );
    assert!(run(&module).diagnostics.is_empty());
}

#[test]
fn metadata_summarizes_contracts() {
    let module = ModuleAst::new("m")
        .with_function(
            FunctionDecl::new("charge", at(5))
                .with_params(&["amount"])
                .with_decorator(contract("pre", vec![Expr::lambda(&["amount"], Expr::name("amount", at(1)), at(1))], 1))
                .with_decorator(contract("raises", vec![Expr::name("ValueError", at(2))], 2))
                .with_decorator(contract("has", vec![Expr::str("network", at(3))], 3))
                .with_decorator(Expr::dotted("deal.safe", at(4)))
                .with_body(vec![Stmt::raise_new("ValueError", at(6))]),
        )
        .with_function(FunctionDecl::new("plain", at(8)));
    let report = run(&module);

    assert_eq!(report.metadata.len(), 1);
    let meta = &report.metadata[0];
    assert_eq!(meta.function, "charge");
    assert_eq!(meta.line, 5);
    assert_eq!(meta.declared_raises, vec!["ValueError"]);
    assert!(meta.safe);
    assert!(!meta.pure);
    assert_eq!(meta.markers, vec!["network"]);
    assert_eq!(meta.predicates.pre, 1);
    let inferred = meta.inferred.as_ref().unwrap();
    assert_eq!(inferred.raises, vec!["ValueError"]);

    // `safe` contradicts the raise; `raises` is satisfied.
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].line, 6);
    assert_eq!(
        report.diagnostics[0].message,
        "function is declared `safe` but may raise an exception"
    );
}

#[test]
fn diagnostics_are_grouped_by_declaration() {
    let module = ModuleAst::new("shop.cart")
        .with_function(
            FunctionDecl::new("total", at(2))
                .with_decorator(contract("raises", vec![Expr::name("ValueError", Span::new(1, 13))], 1))
                .with_body(vec![
                    Stmt::raise_new("KeyError", Span::new(3, 4)),
                ]),
        )
        .with_function(
            FunctionDecl::new("log", at(6))
                .with_decorator(Expr::dotted("deal.pure", Span::new(5, 1)))
                .with_body(vec![Stmt::expr(Expr::call_external("print", vec![], Span::new(7, 4)))]),
        );
    let report = run(&module);
    insta::assert_snapshot!(render_text(&report.diagnostics), @r"
    shop.cart:1:13: info ATT012 `ValueError` is declared in `raises` but never raised
    shop.cart:3:4: error ATT011 `KeyError` may be raised but is not declared in `raises`
    shop.cart:7:4: error ATT021 function is declared `pure` but performs I/O
    ");

    let lint: Vec<LintMessage> = report.diagnostics.iter().map(LintMessage::from).collect();
    assert_eq!(lint[2].text, "ATT021 function is declared `pure` but performs I/O");
    assert_eq!(report.error_count(), 2);
}

#[test]
fn report_serializes_to_json() {
    let module = ModuleAst::new("m").with_function(
        FunctionDecl::new("f", at(1)).with_body(vec![Stmt::raise_new("KeyError", at(2))]),
    );
    let report = run(&module);
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["module_id"], "m");
    assert_eq!(value["facts"][0]["function"], "f");
    assert_eq!(value["facts"][0]["raises"][0], "KeyError");
    assert!(value.get("failure").is_none());
}
