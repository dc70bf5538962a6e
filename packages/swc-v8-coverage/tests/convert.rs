use proptest::prelude::*;
use sourcemap::SourceMapBuilder;
use swc_v8_coverage::{
    BranchType, ByteRange, ConvertInput, ConvertOptions, Converter, CoverageError, CoverageMap, FileCoverage,
    FunctionCoverage, FunctionKind, FunctionShape, NodeKind, ParsedSource, RawRange, Result, ScriptCoverage,
    SourceNode, SourceParser, StatementKind, SwcParser,
};

fn script(ranges: &[(u32, u32, u32)]) -> ScriptCoverage {
    ScriptCoverage {
        script_id: "1".into(),
        url: "file:///app/main.js".into(),
        functions: ranges
            .iter()
            .map(|&(start, end, count)| FunctionCoverage {
                function_name: String::new(),
                ranges: vec![RawRange::new(start, end, count)],
                is_block_coverage: true,
            })
            .collect(),
    }
}

fn offset(src: &str, needle: &str) -> u32 {
    src.find(needle).unwrap_or_else(|| panic!("{needle:?} not in source")) as u32
}

fn convert_with(options: ConvertOptions, path: &str, src: &str, ranges: &[(u32, u32, u32)]) -> Result<CoverageMap> {
    let converter = Converter::new(options)?;
    let coverage = script(ranges);
    converter.convert(ConvertInput {
        path,
        source: src,
        coverage: &coverage,
        parser: &SwcParser,
        source_map: None,
    })
}

fn convert(src: &str, ranges: &[(u32, u32, u32)]) -> FileCoverage {
    let map = convert_with(ConvertOptions::default(), "/app/main.js", src, ranges).unwrap();
    map.get("/app/main.js").cloned().unwrap()
}

#[test]
fn curried_arrows_are_separate_functions() {
    let src = "const add = a => b => a + b;\nadd(1)(2);\n";
    let outer = offset(src, "a =>");
    let inner = offset(src, "b =>");
    let end = offset(src, ";\nadd");
    let cov = convert(src, &[(0, src.len() as u32, 1), (outer, end, 1), (inner, end, 1)]);

    assert_eq!(cov.fn_map.len(), 2);
    assert_eq!(cov.f.values().copied().collect::<Vec<_>>(), vec![1, 1]);
    let (first, second) = (&cov.fn_map[&0], &cov.fn_map[&1]);
    assert!(first.decl.start < second.decl.start);
    assert!(first.loc.start <= second.loc.start && second.loc.end <= first.loc.end);
    assert_eq!(first.name, "(anonymous_0)");
}

#[test]
fn returned_but_uncalled_inner_arrow_counts_zero() {
    let src = "const add = a => b => a + b;\nadd(1);\n";
    let outer = offset(src, "a =>");
    let inner = offset(src, "b =>");
    let end = offset(src, ";\nadd");
    let cov = convert(src, &[(0, src.len() as u32, 1), (outer, end, 1), (inner, end, 0)]);
    assert_eq!(cov.f.values().copied().collect::<Vec<_>>(), vec![1, 0]);
}

#[test]
fn ignore_next_drops_one_statement() {
    let src = r#"/* v8 ignore next */ noop("Ignored"); noop("Included");"#;
    let cov = convert(src, &[(0, src.len() as u32, 1)]);
    assert_eq!(cov.statement_map.len(), 1);
    assert_eq!(cov.statement_map[&0].start.column, offset(src, r#"noop("Included")"#));
}

#[test]
fn ternary_counts_each_side() {
    let src = "const condition = true;\nconst r = condition ? a() : b();\n";
    let alt = offset(src, "b()");
    let cov = convert(src, &[(0, src.len() as u32, 1), (alt, alt + 3, 0)]);
    let (key, branch) = cov
        .branch_map
        .iter()
        .find(|(_, branch)| branch.kind == BranchType::CondExpr)
        .unwrap();
    assert_eq!(branch.locations.len(), 2);
    assert_eq!(cov.b[key], vec![1, 0]);
}

#[test]
fn switch_case_ignored_inline() {
    let src = "\
switch (value) {
  /* v8 ignore next */
  case 1:
    one();
    break;
  case 2:
    two();
    break;
  default:
    other();
}
";
    let cov = convert(src, &[(0, src.len() as u32, 1)]);
    let switch = cov.branch_map.values().find(|b| b.kind == BranchType::Switch).unwrap();
    assert_eq!(switch.locations.len(), 2);
    assert!(cov.statement_map.values().all(|range| range.start.line != 4));
}

#[test]
fn logical_chain_is_one_branch() {
    let src = "const v = a || b || c;\n";
    let b = offset(src, "b ||");
    let c = offset(src, "c;");
    let cov = convert(src, &[(0, src.len() as u32, 1), (b, c - 4, 0), (c, c + 1, 0)]);
    assert_eq!(cov.branch_map.len(), 1);
    assert_eq!(cov.b[&0], vec![1, 0, 0]);
}

#[test]
fn ignore_next_inside_a_ternary_drops_one_side() {
    let src = "const r = a ? /* v8 ignore next */ b() : c();\n";
    let cov = convert(src, &[(0, src.len() as u32, 1)]);
    let branch = &cov.branch_map[&0];
    assert_eq!(branch.kind, BranchType::CondExpr);
    assert_eq!(branch.locations.len(), 1);
    assert_eq!(branch.locations[0].start.column, offset(src, "c()"));
    assert_eq!(cov.b[&0], vec![1]);
}

#[test]
fn ignore_next_before_a_catch_body() {
    let src = "try { a(); } catch (e) /* v8 ignore next */ { b(); }\nc();\n";
    let cov = convert(src, &[(0, src.len() as u32, 1)]);
    let columns: Vec<(u32, u32)> = cov
        .statement_map
        .values()
        .map(|range| (range.start.line, range.start.column))
        .collect();
    assert_eq!(columns, vec![(1, 0), (1, offset(src, "a()")), (2, 0)]);
}

fn default_arg_hits(calls: &str, with_default: u32, total: u32) -> Vec<u32> {
    let src = format!("function f(a = 1) {{ return a; }}\n{calls}");
    let fn_end = offset(&src, "\n");
    let default = offset(&src, "1)");
    let cov = convert(
        &src,
        &[(0, src.len() as u32, 1), (0, fn_end, total), (default, default + 1, with_default)],
    );
    let (key, _) = cov
        .branch_map
        .iter()
        .find(|(_, branch)| branch.kind == BranchType::DefaultArg)
        .unwrap();
    cov.b[key].clone()
}

#[test]
fn default_args_count_omitted_then_provided() {
    assert_eq!(default_arg_hits("f();\nf(2);\n", 1, 2), vec![1, 1]);
    assert_eq!(default_arg_hits("f();\n", 1, 1), vec![1, 0]);
    assert_eq!(default_arg_hits("f(2);\n", 0, 1), vec![0, 1]);
}

#[test]
fn optional_chain_counts_short_circuit_then_evaluated() {
    let src = "const v = o?.b;\n";
    let access = offset(src, "?.b");
    let skipped = convert(src, &[(0, src.len() as u32, 1), (access, access + 3, 0)]);
    let branch = &skipped.branch_map[&0];
    assert_eq!(branch.kind, BranchType::OptionalChain);
    assert_eq!(skipped.b[&0], vec![1, 0]);

    let evaluated = convert(src, &[(0, src.len() as u32, 1)]);
    assert_eq!(evaluated.b[&0], vec![0, 1]);
}

#[test]
fn mapped_statement_ends_on_a_segment_boundary() {
    let src = "foo();bar();";
    let mut builder = SourceMapBuilder::new(None);
    builder.add(0, 0, 0, 0, Some("main.ts"), None, false);
    builder.add(0, 6, 2, 0, Some("main.ts"), None, false);
    let map = builder.into_sourcemap();

    let converter = Converter::new(ConvertOptions::default()).unwrap();
    let coverage = script(&[(0, src.len() as u32, 1)]);
    let out = converter
        .convert(ConvertInput {
            path: "/app/main.js",
            source: src,
            coverage: &coverage,
            parser: &SwcParser,
            source_map: Some(&map),
        })
        .unwrap();
    let cov = out.get("/app/main.ts").unwrap();
    let first = &cov.statement_map[&0];
    assert_eq!((first.start.line, first.end.line), (1, 1));
    assert_eq!(cov.statement_map[&1].start.line, 3);
}

#[test]
fn rerun_is_byte_identical() {
    let src = "function f(a = 1) {\n  if (a > 1) { return a?.b; }\n  return a || 2;\n}\nf();\n";
    let ranges = [(0, src.len() as u32, 1), (0, offset(src, "\nf();"), 1)];
    let first = serde_json::to_string(&convert(src, &ranges)).unwrap();
    let second = serde_json::to_string(&convert(src, &ranges)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn ignored_ranges_leave_nothing_behind() {
    let src = "\
a();
/* istanbul ignore next */
function skipped(x) {
  if (x) { return x || 1; }
}
b();
";
    let cov = convert(src, &[(0, src.len() as u32, 1)]);
    assert!(cov.fn_map.is_empty());
    assert!(cov.branch_map.is_empty());
    let lines: Vec<u32> = cov.statement_map.values().map(|range| range.start.line).collect();
    assert_eq!(lines, vec![1, 6]);
}

#[test]
fn unresolved_directive_fails_the_script() {
    let src = "a();\n/* c8 ignore next */\n";
    let err = convert_with(ConvertOptions::default(), "/app/main.js", src, &[(0, src.len() as u32, 1)]).unwrap_err();
    match err {
        CoverageError::UnresolvedIgnoreDirective { directive, line, column } => {
            assert_eq!(directive, "c8 ignore next");
            assert_eq!((line, column), (2, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn class_method_patterns_keep_the_method_entry() {
    let src = "\
class View {
  renderRow() {
    return row();
  }
  update() {
    return 1;
  }
}
";
    let options = ConvertOptions {
        ignore_class_methods: vec!["render*".into()],
        ..ConvertOptions::default()
    };
    let map = convert_with(options, "/app/main.js", src, &[(0, src.len() as u32, 1)]).unwrap();
    let cov = map.get("/app/main.js").unwrap();
    let names: Vec<_> = cov.fn_map.values().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["renderRow", "update"]);
    assert_eq!(cov.statement_map.len(), 1);
    assert_eq!(cov.statement_map[&0].start.line, 6);
}

#[test]
fn node_modules_are_dropped_by_default() {
    let src = "a();\n";
    let map = convert_with(
        ConvertOptions::default(),
        "/app/node_modules/dep/index.js",
        src,
        &[(0, src.len() as u32, 1)],
    )
    .unwrap();
    assert!(map.is_empty());

    let options = ConvertOptions {
        ignore_node_modules: false,
        ..ConvertOptions::default()
    };
    let map = convert_with(options, "/app/node_modules/dep/index.js", src, &[(0, src.len() as u32, 1)]).unwrap();
    assert_eq!(map.len(), 1);
}

#[test]
fn commonjs_wrapper_is_subtracted() {
    let src = "if (x) { a(); }\n";
    let wrapper = 62;
    let consequent = offset(src, "{ a");
    let options = ConvertOptions {
        wrapper_length: wrapper,
        ..ConvertOptions::default()
    };
    let ranges = [
        (0, wrapper + src.len() as u32 + 3, 1),
        (wrapper + consequent, wrapper + consequent + 7, 0),
    ];
    let map = convert_with(options, "/app/main.js", src, &ranges).unwrap();
    let cov = map.get("/app/main.js").unwrap();
    assert_eq!(cov.b[&0], vec![0, 1]);
}

#[test]
fn offsets_are_utf16_code_units() {
    let src = "const s = '🦀🦀';\nif (x) { a(); }\n";
    let utf16 = |byte: u32| src[..byte as usize].encode_utf16().count() as u32;
    let consequent = offset(src, "{ a");
    let total = utf16(src.len() as u32);
    let cov = convert(src, &[(0, total, 1), (utf16(consequent), utf16(consequent) + 7, 0)]);
    let (key, _) = cov.branch_map.iter().find(|(_, b)| b.kind == BranchType::If).unwrap();
    assert_eq!(cov.b[key], vec![0, 1]);
    let if_stmt = cov.statement_map.values().find(|r| r.start.line == 2).unwrap();
    assert_eq!(if_stmt.start.column, 0);
}

#[test]
fn source_mapped_positions_land_in_the_original_file() {
    let src = "foo();\nbar();\n";
    let mut builder = SourceMapBuilder::new(None);
    builder.add(0, 0, 0, 0, Some("../src/main.ts"), None, false);
    builder.add(1, 0, 4, 2, Some("../src/main.ts"), None, false);
    let map = builder.into_sourcemap();

    let converter = Converter::new(ConvertOptions::default()).unwrap();
    let coverage = script(&[(0, src.len() as u32, 1)]);
    let out = converter
        .convert(ConvertInput {
            path: "/app/dist/main.js",
            source: src,
            coverage: &coverage,
            parser: &SwcParser,
            source_map: Some(&map),
        })
        .unwrap();

    assert!(out.get("/app/dist/main.js").is_none());
    let cov = out.get("/app/src/main.ts").unwrap();
    assert_eq!(cov.statement_map.len(), 2);
    assert_eq!(cov.statement_map[&1].start.line, 5);
    assert_eq!(cov.statement_map[&1].start.column, 2);
    assert!(cov.statement_map[&1].end.is_unbounded());
}

/// A backend that hands back a prebuilt tree.
struct FixedParser(ParsedSource);

impl SourceParser for FixedParser {
    fn parse(&self, _path: &str, _source: &str) -> Result<ParsedSource> {
        Ok(self.0.clone())
    }
}

#[test]
fn any_backend_can_supply_the_tree() {
    let src = "function f(){g()}f()";
    let statement = |start, end| {
        SourceNode::new(
            NodeKind::Statement {
                kind: StatementKind::Expression,
            },
            ByteRange::new(start, end),
        )
    };
    let function = SourceNode::new(
        NodeKind::Function(FunctionShape {
            kind: FunctionKind::Declaration,
            decl: ByteRange::new(0, 13),
            body: ByteRange::new(12, 17),
            count_offset: 12,
            expression_body: false,
        }),
        ByteRange::new(0, 17),
    )
    .with_name("f")
    .with_children(vec![statement(13, 16)]);
    let root = SourceNode::new(NodeKind::Program, ByteRange::new(0, 20))
        .with_children(vec![function, statement(17, 20)]);
    let parser = FixedParser(ParsedSource {
        root,
        comments: Vec::new(),
    });

    let converter = Converter::new(ConvertOptions::default()).unwrap();
    let coverage = script(&[(0, 20, 1), (0, 17, 0)]);
    let input = ConvertInput {
        path: "/app/main.js",
        source: src,
        coverage: &coverage,
        parser: &parser,
        source_map: None,
    };
    let custom = converter.convert(input).unwrap();
    let cov = custom.get("/app/main.js").unwrap();
    assert_eq!(cov.fn_map[&0].name, "f");
    assert_eq!(cov.f[&0], 0);
    assert_eq!(cov.s.values().copied().collect::<Vec<_>>(), vec![0, 1]);

    let swc = convert(src, &[(0, 20, 1), (0, 17, 0)]);
    assert_eq!(swc.s, cov.s);
    assert_eq!(swc.f, cov.f);
}

fn converted(counts: (u32, u32)) -> FileCoverage {
    let src = "function f(x) {\n  return x ? 1 : 2;\n}\nf(a);\n";
    let fn_end = offset(src, "\nf(a)");
    let alt = offset(src, "2;");
    convert(src, &[(0, src.len() as u32, 1), (0, fn_end, counts.0), (alt, alt + 1, counts.1)])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn merging_runs_is_order_independent(a in (0u32..4, 0u32..4), b in (0u32..4, 0u32..4), c in (0u32..4, 0u32..4)) {
        let (a, b, c) = (converted(a), converted(b), converted(c));
        let mut left = CoverageMap::new();
        left.merge_file(a.clone());
        left.merge_file(b.clone());
        left.merge_file(c.clone());

        let mut bc = CoverageMap::new();
        bc.merge_file(c);
        bc.merge_file(b);
        let mut right = CoverageMap::new();
        right.merge_file(a);
        right.merge(bc);

        prop_assert_eq!(left.get("/app/main.js"), right.get("/app/main.js"));
    }
}
