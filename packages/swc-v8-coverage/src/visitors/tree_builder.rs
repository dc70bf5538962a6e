use swc_core::{
    common::{Span, Spanned},
    ecma::{
        ast::*,
        visit::{Visit, VisitWith},
    },
};

use crate::syntax_tree::{
    ByteRange, FunctionKind, FunctionShape, LogicalOperator, NodeKind, OperandRole, SourceNode, StatementKind,
};

/// Position of the first source byte handed to the lexer; `BytePos(0)` is the
/// dummy position in swc.
pub const SPAN_BASE: u32 = 1;

/// Walks an swc [`Program`] and keeps only what coverage needs.
pub struct TreeBuilder<'s> {
    source: &'s str,
    root: SourceNode,
    open: Vec<SourceNode>,
}

impl<'s> TreeBuilder<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            root: SourceNode::new(NodeKind::Program, ByteRange::new(0, source.len() as u32)),
            open: Vec::new(),
        }
    }

    pub fn build(mut self, program: &Program) -> SourceNode {
        match program {
            Program::Module(module) => {
                for item in module
                    .body
                    .iter()
                    .skip_while(|item| matches!(item, ModuleItem::Stmt(stmt) if is_directive(stmt)))
                {
                    item.visit_with(&mut self);
                }
            }
            Program::Script(script) => self.visit_body(&script.body),
        }
        self.root
    }

    fn range(&self, span: Span) -> ByteRange {
        ByteRange::new(span.lo.0.saturating_sub(SPAN_BASE), span.hi.0.saturating_sub(SPAN_BASE))
    }

    fn slice(&self, span: Span) -> &'s str {
        let range = self.range(span);
        self.source
            .get(range.start as usize..range.end as usize)
            .unwrap_or_default()
    }

    fn current(&mut self) -> &mut SourceNode {
        match self.open.last_mut() {
            Some(node) => node,
            None => &mut self.root,
        }
    }

    fn with_node(&mut self, node: SourceNode, f: impl FnOnce(&mut Self)) {
        self.open.push(node);
        f(self);
        if let Some(node) = self.open.pop() {
            self.current().children.push(node);
        }
    }

    fn operand_at(&mut self, role: OperandRole, range: ByteRange, f: impl FnOnce(&mut Self)) {
        self.with_node(SourceNode::new(NodeKind::Operand { role }, range), f);
    }

    fn operand(&mut self, role: OperandRole, span: Span, f: impl FnOnce(&mut Self)) {
        let range = self.range(span);
        self.operand_at(role, range, f);
    }

    fn statement(&mut self, kind: StatementKind, span: Span, f: impl FnOnce(&mut Self)) {
        let node = SourceNode::new(NodeKind::Statement { kind }, self.range(span));
        self.with_node(node, f);
    }

    fn initializer(&mut self, expr: &Expr) {
        self.statement(StatementKind::Initializer, expr.span(), |b| expr.visit_with(b));
    }

    /// Statements of a script or function body, directive prologue excluded.
    fn visit_body(&mut self, stmts: &[Stmt]) {
        for stmt in stmts.iter().skip_while(|stmt| is_directive(stmt)) {
            stmt.visit_with(self);
        }
    }

    fn prop_name(&self, key: &PropName) -> String {
        match key {
            PropName::Ident(ident) => ident.sym.to_string(),
            PropName::Str(s) => s.value.to_string(),
            _ => self.slice(key.span()).to_string(),
        }
    }

    /// A function with a braced body. Bodiless signatures are skipped.
    fn function_like(
        &mut self,
        kind: FunctionKind,
        range: ByteRange,
        name: Option<String>,
        body: Option<&BlockStmt>,
        params: impl FnOnce(&mut Self),
    ) {
        let Some(body) = body else {
            return;
        };
        let body_range = self.range(body.span);
        let shape = FunctionShape {
            kind,
            decl: ByteRange::new(range.start, body_range.start + 1),
            body: body_range,
            count_offset: body_range.start,
            expression_body: false,
        };
        let mut node = SourceNode::new(NodeKind::Function(shape), range);
        node.name = name;
        self.with_node(node, |b| {
            params(b);
            b.visit_body(&body.stmts);
        });
    }

    fn function(&mut self, kind: FunctionKind, range: ByteRange, name: Option<String>, function: &Function) {
        self.function_like(kind, range, name, function.body.as_ref(), |b| {
            for param in &function.params {
                param.visit_with(b);
            }
        });
    }

    fn class(&mut self, class: &Class, name: Option<String>) {
        let range = self.range(class.span);
        let shape = FunctionShape {
            kind: FunctionKind::Class,
            decl: range,
            body: range,
            count_offset: range.start,
            expression_body: false,
        };
        let mut node = SourceNode::new(NodeKind::Function(shape), range);
        node.name = name;
        self.with_node(node, |b| class.visit_children_with(b));
    }
}

fn is_directive(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(ExprStmt { expr, .. }) if matches!(&**expr, Expr::Lit(Lit::Str(_))))
}

fn statement_kind(stmt: &Stmt) -> Option<StatementKind> {
    let kind = match stmt {
        Stmt::Expr(_) => StatementKind::Expression,
        Stmt::If(_) => StatementKind::If,
        Stmt::Switch(_) => StatementKind::Switch,
        Stmt::For(_) => StatementKind::For,
        Stmt::ForIn(_) => StatementKind::ForIn,
        Stmt::ForOf(_) => StatementKind::ForOf,
        Stmt::While(_) => StatementKind::While,
        Stmt::DoWhile(_) => StatementKind::DoWhile,
        Stmt::Try(_) => StatementKind::Try,
        Stmt::Return(_) => StatementKind::Return,
        Stmt::Throw(_) => StatementKind::Throw,
        Stmt::Break(_) => StatementKind::Break,
        Stmt::Continue(_) => StatementKind::Continue,
        Stmt::Debugger(_) => StatementKind::Debugger,
        Stmt::With(_) => StatementKind::With,
        Stmt::Labeled(_) => StatementKind::Labeled,
        _ => return None,
    };
    Some(kind)
}

fn unparen(expr: &Expr) -> &Expr {
    let mut expr = expr;
    while let Expr::Paren(paren) = expr {
        expr = &paren.expr;
    }
    expr
}

impl Visit for TreeBuilder<'_> {
    fn visit_stmt(&mut self, n: &Stmt) {
        match statement_kind(n) {
            Some(kind) => self.statement(kind, n.span(), |b| n.visit_children_with(b)),
            None => n.visit_children_with(self),
        }
    }

    fn visit_block_stmt(&mut self, n: &BlockStmt) {
        let node = SourceNode::new(NodeKind::Block, self.range(n.span));
        self.with_node(node, |b| {
            for stmt in &n.stmts {
                stmt.visit_with(b);
            }
        });
    }

    fn visit_if_stmt(&mut self, n: &IfStmt) {
        self.operand(OperandRole::Test, n.test.span(), |b| n.test.visit_with(b));
        self.operand(OperandRole::Consequent, n.cons.span(), |b| n.cons.visit_with(b));
        if let Some(alt) = &n.alt {
            self.operand(OperandRole::Alternate, alt.span(), |b| alt.visit_with(b));
        }
    }

    fn visit_switch_stmt(&mut self, n: &SwitchStmt) {
        self.operand(OperandRole::Test, n.discriminant.span(), |b| n.discriminant.visit_with(b));
        for case in &n.cases {
            case.visit_with(self);
        }
    }

    fn visit_switch_case(&mut self, n: &SwitchCase) {
        let node = SourceNode::new(
            NodeKind::SwitchCase {
                is_default: n.test.is_none(),
            },
            self.range(n.span),
        );
        self.with_node(node, |b| {
            if let Some(test) = &n.test {
                b.operand(OperandRole::Test, test.span(), |b| test.visit_with(b));
            }
            for stmt in &n.cons {
                stmt.visit_with(b);
            }
        });
    }

    fn visit_catch_clause(&mut self, n: &CatchClause) {
        if let Some(param) = &n.param {
            param.visit_with(self);
        }
        self.operand(OperandRole::Handler, n.body.span, |b| n.body.visit_with(b));
    }

    fn visit_fn_decl(&mut self, n: &FnDecl) {
        let range = self.range(n.function.span);
        self.function(
            FunctionKind::Declaration,
            range,
            Some(n.ident.sym.to_string()),
            &n.function,
        );
    }

    fn visit_fn_expr(&mut self, n: &FnExpr) {
        let range = self.range(n.function.span);
        let name = n.ident.as_ref().map(|ident| ident.sym.to_string());
        self.function(FunctionKind::Expression, range, name, &n.function);
    }

    fn visit_arrow_expr(&mut self, n: &ArrowExpr) {
        let range = self.range(n.span);
        match &*n.body {
            BlockStmtOrExpr::BlockStmt(body) => {
                self.function_like(FunctionKind::Arrow, range, None, Some(body), |b| {
                    for param in &n.params {
                        param.visit_with(b);
                    }
                });
            }
            BlockStmtOrExpr::Expr(expr) => {
                let body = self.range(expr.span());
                // The body start of `a => b => c` is the inner arrow, whose own
                // range would shadow the outer call count.
                let count_offset = n
                    .params
                    .last()
                    .map_or(range.start, |param| self.range(param.span()).end);
                let shape = FunctionShape {
                    kind: FunctionKind::Arrow,
                    decl: ByteRange::new(range.start, body.start + 1),
                    body,
                    count_offset,
                    expression_body: true,
                };
                self.with_node(SourceNode::new(NodeKind::Function(shape), range), |b| {
                    for param in &n.params {
                        param.visit_with(b);
                    }
                    b.statement(StatementKind::ArrowBody, expr.span(), |b| expr.visit_with(b));
                });
            }
        }
    }

    fn visit_class_method(&mut self, n: &ClassMethod) {
        n.key.visit_with(self);
        let kind = match n.kind {
            MethodKind::Method => FunctionKind::Method,
            MethodKind::Getter => FunctionKind::Getter,
            MethodKind::Setter => FunctionKind::Setter,
        };
        let range = self.range(n.span);
        let name = self.prop_name(&n.key);
        self.function(kind, range, Some(name), &n.function);
    }

    fn visit_private_method(&mut self, n: &PrivateMethod) {
        let kind = match n.kind {
            MethodKind::Method => FunctionKind::Method,
            MethodKind::Getter => FunctionKind::Getter,
            MethodKind::Setter => FunctionKind::Setter,
        };
        let range = self.range(n.span);
        let name = self.slice(n.key.span()).to_string();
        self.function(kind, range, Some(name), &n.function);
    }

    fn visit_constructor(&mut self, n: &Constructor) {
        let range = self.range(n.span);
        self.function_like(
            FunctionKind::Constructor,
            range,
            Some("constructor".to_string()),
            n.body.as_ref(),
            |b| {
                for param in &n.params {
                    param.visit_with(b);
                }
            },
        );
    }

    fn visit_method_prop(&mut self, n: &MethodProp) {
        n.key.visit_with(self);
        // The function span covers `async` and `*` prefixes.
        let function = self.range(n.function.span);
        let range = ByteRange::new(function.start.min(self.range(n.key.span()).start), function.end);
        let name = self.prop_name(&n.key);
        self.function(FunctionKind::Method, range, Some(name), &n.function);
    }

    fn visit_getter_prop(&mut self, n: &GetterProp) {
        n.key.visit_with(self);
        let range = self.range(n.span);
        let name = self.prop_name(&n.key);
        self.function_like(FunctionKind::Getter, range, Some(name), n.body.as_ref(), |_| {});
    }

    fn visit_setter_prop(&mut self, n: &SetterProp) {
        n.key.visit_with(self);
        let range = self.range(n.span);
        let name = self.prop_name(&n.key);
        self.function_like(FunctionKind::Setter, range, Some(name), n.body.as_ref(), |b| {
            n.param.visit_with(b)
        });
    }

    fn visit_class_decl(&mut self, n: &ClassDecl) {
        self.class(&n.class, Some(n.ident.sym.to_string()));
    }

    fn visit_class_expr(&mut self, n: &ClassExpr) {
        let name = n.ident.as_ref().map(|ident| ident.sym.to_string());
        self.class(&n.class, name);
    }

    fn visit_class_prop(&mut self, n: &ClassProp) {
        n.key.visit_with(self);
        if let Some(value) = &n.value {
            self.initializer(value);
        }
    }

    fn visit_private_prop(&mut self, n: &PrivateProp) {
        if let Some(value) = &n.value {
            self.initializer(value);
        }
    }

    fn visit_var_decl(&mut self, n: &VarDecl) {
        let node = SourceNode::new(NodeKind::Declaration, self.range(n.span));
        self.with_node(node, |b| n.visit_children_with(b));
    }

    fn visit_var_declarator(&mut self, n: &VarDeclarator) {
        n.name.visit_with(self);
        if let Some(init) = &n.init {
            self.initializer(init);
        }
    }

    fn visit_module_decl(&mut self, n: &ModuleDecl) {
        match n {
            ModuleDecl::ExportDecl(_) | ModuleDecl::ExportDefaultDecl(_) | ModuleDecl::ExportDefaultExpr(_) => {
                let node = SourceNode::new(NodeKind::Declaration, self.range(n.span()));
                self.with_node(node, |b| n.visit_children_with(b));
            }
            _ => {}
        }
    }

    fn visit_export_default_expr(&mut self, n: &ExportDefaultExpr) {
        self.initializer(&n.expr);
    }

    fn visit_bin_expr(&mut self, n: &BinExpr) {
        let operator = match n.op {
            BinaryOp::LogicalAnd => LogicalOperator::And,
            BinaryOp::LogicalOr => LogicalOperator::Or,
            BinaryOp::NullishCoalescing => LogicalOperator::Nullish,
            _ => return n.visit_children_with(self),
        };
        let node = SourceNode::new(NodeKind::Logical { operator }, self.range(n.span));
        self.with_node(node, |b| {
            for side in [&n.left, &n.right] {
                b.operand(OperandRole::Operand, unparen(side).span(), |b| side.visit_with(b));
            }
        });
    }

    fn visit_cond_expr(&mut self, n: &CondExpr) {
        let node = SourceNode::new(NodeKind::Conditional, self.range(n.span));
        self.with_node(node, |b| {
            b.operand(OperandRole::Test, n.test.span(), |b| n.test.visit_with(b));
            b.operand(OperandRole::Consequent, n.cons.span(), |b| n.cons.visit_with(b));
            b.operand(OperandRole::Alternate, n.alt.span(), |b| n.alt.visit_with(b));
        });
    }

    fn visit_assign_pat(&mut self, n: &AssignPat) {
        let node = SourceNode::new(NodeKind::DefaultValue, self.range(n.span));
        self.with_node(node, |b| {
            b.operand(OperandRole::Binding, n.left.span(), |b| n.left.visit_with(b));
            b.operand(OperandRole::Default, n.right.span(), |b| n.right.visit_with(b));
        });
    }

    fn visit_assign_pat_prop(&mut self, n: &AssignPatProp) {
        let Some(value) = &n.value else {
            return;
        };
        let node = SourceNode::new(NodeKind::DefaultValue, self.range(n.span));
        self.with_node(node, |b| {
            b.operand(OperandRole::Binding, n.key.span(), |_| {});
            b.operand(OperandRole::Default, value.span(), |b| value.visit_with(b));
        });
    }

    fn visit_opt_chain_expr(&mut self, n: &OptChainExpr) {
        if !n.optional {
            return n.visit_children_with(self);
        }
        let range = self.range(n.span);
        self.with_node(SourceNode::new(NodeKind::OptionalChain, range), |b| match &*n.base {
            OptChainBase::Member(member) => {
                let base = b.range(member.obj.span());
                b.operand_at(OperandRole::Base, base, |b| member.obj.visit_with(b));
                b.operand_at(OperandRole::Access, ByteRange::new(base.end, range.end), |b| {
                    member.prop.visit_with(b)
                });
            }
            OptChainBase::Call(call) => {
                let base = b.range(call.callee.span());
                b.operand_at(OperandRole::Base, base, |b| call.callee.visit_with(b));
                b.operand_at(OperandRole::Access, ByteRange::new(base.end, range.end), |b| {
                    for arg in &call.args {
                        arg.visit_with(b);
                    }
                });
            }
        });
    }
}
