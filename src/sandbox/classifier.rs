//! Static safety gate over the parsed syntax tree.
//!
//! Submitted source is parsed with `rustpython-parser` and every node of the
//! resulting tree is visited once. The walk rejects on the first import
//! statement, denylisted direct call, denylisted method call, or denylisted
//! attribute access it encounters. Nothing is evaluated here; a rejected
//! submission never reaches the interpreter.
//!
//! The denylists live in [`SafetyPolicy`] as plain data so the policy can be
//! tested independently of the traversal.

use rustpython_parser::{ast, Parse};

use crate::error::SandboxFailure;

/// Direct calls that allow dynamic evaluation, I/O, or namespace introspection.
const FORBIDDEN_CALLS: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "__import__",
    "open",
    "file",
    "input",
    "raw_input",
    "reload",
    "vars",
    "locals",
    "globals",
    "getattr",
    "setattr",
    "delattr",
    "hasattr",
];

/// Method names associated with process control (e.g. `os.system`).
const FORBIDDEN_METHODS: &[&str] = &["system", "popen", "spawn", "fork"];

/// Type-introspection internals usable for sandbox escapes.
const FORBIDDEN_ATTRIBUTES: &[&str] = &["__class__", "__bases__", "__subclasses__", "__globals__"];

/// The denylist tables consulted by [`classify`].
///
/// A policy is pure data; the same generic tree walk applies whichever
/// tables are supplied.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    /// Names whose direct call form `name(...)` is rejected.
    pub forbidden_calls: &'static [&'static str],
    /// Attribute names whose method-call form `obj.name(...)` is rejected.
    pub forbidden_methods: &'static [&'static str],
    /// Attribute names rejected in any attribute access.
    pub forbidden_attributes: &'static [&'static str],
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            forbidden_calls: FORBIDDEN_CALLS,
            forbidden_methods: FORBIDDEN_METHODS,
            forbidden_attributes: FORBIDDEN_ATTRIBUTES,
        }
    }
}

impl SafetyPolicy {
    /// Check whether a direct call to `name` is denylisted.
    pub fn is_forbidden_call(&self, name: &str) -> bool {
        self.forbidden_calls.contains(&name)
    }

    /// Check whether a method call named `name` is denylisted.
    pub fn is_forbidden_method(&self, name: &str) -> bool {
        self.forbidden_methods.contains(&name)
    }

    /// Check whether accessing attribute `name` is denylisted.
    pub fn is_forbidden_attribute(&self, name: &str) -> bool {
        self.forbidden_attributes.contains(&name)
    }
}

/// The allow/deny decision for one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationVerdict {
    /// No node in the tree matched a denylist; the source may be evaluated.
    Allowed,
    /// The source must not be evaluated; carries the reason.
    Rejected(SandboxFailure),
}

impl ClassificationVerdict {
    /// Check if the submission passed.
    pub fn allowed(&self) -> bool {
        matches!(self, ClassificationVerdict::Allowed)
    }

    /// Extract the rejection, if any.
    pub fn into_rejection(self) -> Option<SandboxFailure> {
        match self {
            ClassificationVerdict::Allowed => None,
            ClassificationVerdict::Rejected(failure) => Some(failure),
        }
    }
}

/// Classify submitted source against a policy.
///
/// Pure function over the source text: parses, walks, and returns a verdict
/// without touching any interpreter state. Denylisted names appearing only
/// inside string literals or comments are not matched; only actual call and
/// attribute nodes count.
pub fn classify(source: &str, policy: &SafetyPolicy) -> ClassificationVerdict {
    let suite = match ast::Suite::parse(source, "<sandbox>") {
        Ok(suite) => suite,
        Err(err) => {
            return ClassificationVerdict::Rejected(SandboxFailure::syntax(err.to_string()))
        }
    };

    let walker = Walker { policy };
    match walker.walk_stmts(&suite) {
        Ok(()) => ClassificationVerdict::Allowed,
        Err(failure) => ClassificationVerdict::Rejected(failure),
    }
}

/// Recursive descent over statements and expressions.
///
/// Returns `Err` on the first denylist match so the verdict carries the
/// earliest offending construct in source order.
struct Walker<'a> {
    policy: &'a SafetyPolicy,
}

impl Walker<'_> {
    fn walk_stmts(&self, stmts: &[ast::Stmt]) -> Result<(), SandboxFailure> {
        for stmt in stmts {
            self.walk_stmt(stmt)?;
        }
        Ok(())
    }

    fn walk_exprs(&self, exprs: &[ast::Expr]) -> Result<(), SandboxFailure> {
        for expr in exprs {
            self.walk_expr(expr)?;
        }
        Ok(())
    }

    fn walk_opt_expr(&self, expr: Option<&ast::Expr>) -> Result<(), SandboxFailure> {
        match expr {
            Some(expr) => self.walk_expr(expr),
            None => Ok(()),
        }
    }

    #[allow(unreachable_patterns)]
    fn walk_stmt(&self, stmt: &ast::Stmt) -> Result<(), SandboxFailure> {
        match stmt {
            ast::Stmt::Import(_) | ast::Stmt::ImportFrom(_) => Err(SandboxFailure::forbidden(
                "module imports are not allowed in the sandbox",
            )),
            ast::Stmt::FunctionDef(ast::StmtFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            })
            | ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef {
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => {
                self.walk_arguments(args)?;
                self.walk_stmts(body)?;
                self.walk_exprs(decorator_list)?;
                self.walk_opt_expr(returns.as_deref())
            }
            ast::Stmt::ClassDef(ast::StmtClassDef {
                bases,
                keywords,
                body,
                decorator_list,
                ..
            }) => {
                self.walk_exprs(bases)?;
                for keyword in keywords {
                    self.walk_expr(&keyword.value)?;
                }
                self.walk_stmts(body)?;
                self.walk_exprs(decorator_list)
            }
            ast::Stmt::Return(ast::StmtReturn { value, .. }) => {
                self.walk_opt_expr(value.as_deref())
            }
            ast::Stmt::Delete(ast::StmtDelete { targets, .. }) => self.walk_exprs(targets),
            ast::Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                self.walk_exprs(targets)?;
                self.walk_expr(value)
            }
            ast::Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
                self.walk_expr(target)?;
                self.walk_expr(value)
            }
            ast::Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                self.walk_expr(target)?;
                self.walk_expr(annotation)?;
                self.walk_opt_expr(value.as_deref())
            }
            ast::Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            })
            | ast::Stmt::AsyncFor(ast::StmtAsyncFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.walk_expr(target)?;
                self.walk_expr(iter)?;
                self.walk_stmts(body)?;
                self.walk_stmts(orelse)
            }
            ast::Stmt::While(ast::StmtWhile {
                test, body, orelse, ..
            }) => {
                self.walk_expr(test)?;
                self.walk_stmts(body)?;
                self.walk_stmts(orelse)
            }
            ast::Stmt::If(ast::StmtIf {
                test, body, orelse, ..
            }) => {
                self.walk_expr(test)?;
                self.walk_stmts(body)?;
                self.walk_stmts(orelse)
            }
            ast::Stmt::With(ast::StmtWith { items, body, .. })
            | ast::Stmt::AsyncWith(ast::StmtAsyncWith { items, body, .. }) => {
                for item in items {
                    self.walk_expr(&item.context_expr)?;
                    self.walk_opt_expr(item.optional_vars.as_deref())?;
                }
                self.walk_stmts(body)
            }
            ast::Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
                self.walk_expr(subject)?;
                for case in cases {
                    self.walk_pattern(&case.pattern)?;
                    self.walk_opt_expr(case.guard.as_deref())?;
                    self.walk_stmts(&case.body)?;
                }
                Ok(())
            }
            ast::Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                self.walk_opt_expr(exc.as_deref())?;
                self.walk_opt_expr(cause.as_deref())
            }
            ast::Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | ast::Stmt::TryStar(ast::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.walk_stmts(body)?;
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.walk_opt_expr(handler.type_.as_deref())?;
                    self.walk_stmts(&handler.body)?;
                }
                self.walk_stmts(orelse)?;
                self.walk_stmts(finalbody)
            }
            ast::Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                self.walk_expr(test)?;
                self.walk_opt_expr(msg.as_deref())
            }
            ast::Stmt::Expr(ast::StmtExpr { value, .. }) => self.walk_expr(value),
            ast::Stmt::Global(_)
            | ast::Stmt::Nonlocal(_)
            | ast::Stmt::Pass(_)
            | ast::Stmt::Break(_)
            | ast::Stmt::Continue(_) => Ok(()),
            _ => Ok(()),
        }
    }

    #[allow(unreachable_patterns)]
    fn walk_expr(&self, expr: &ast::Expr) -> Result<(), SandboxFailure> {
        match expr {
            ast::Expr::Call(ast::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                match func.as_ref() {
                    ast::Expr::Name(ast::ExprName { id, .. })
                        if self.policy.is_forbidden_call(id.as_str()) =>
                    {
                        return Err(SandboxFailure::forbidden(format!(
                            "call to '{}' is not allowed in the sandbox",
                            id
                        )));
                    }
                    ast::Expr::Attribute(ast::ExprAttribute { attr, .. })
                        if self.policy.is_forbidden_method(attr.as_str()) =>
                    {
                        return Err(SandboxFailure::forbidden(format!(
                            "method call '{}' is not allowed in the sandbox",
                            attr
                        )));
                    }
                    _ => {}
                }
                self.walk_expr(func)?;
                self.walk_exprs(args)?;
                for keyword in keywords {
                    self.walk_expr(&keyword.value)?;
                }
                Ok(())
            }
            ast::Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                if self.policy.is_forbidden_attribute(attr.as_str()) {
                    return Err(SandboxFailure::forbidden(format!(
                        "access to attribute '{}' is not allowed in the sandbox",
                        attr
                    )));
                }
                self.walk_expr(value)
            }
            ast::Expr::BoolOp(ast::ExprBoolOp { values, .. }) => self.walk_exprs(values),
            ast::Expr::NamedExpr(ast::ExprNamedExpr { target, value, .. }) => {
                self.walk_expr(target)?;
                self.walk_expr(value)
            }
            ast::Expr::BinOp(ast::ExprBinOp { left, right, .. }) => {
                self.walk_expr(left)?;
                self.walk_expr(right)
            }
            ast::Expr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => self.walk_expr(operand),
            ast::Expr::Lambda(ast::ExprLambda { args, body, .. }) => {
                self.walk_arguments(args)?;
                self.walk_expr(body)
            }
            ast::Expr::IfExp(ast::ExprIfExp {
                test, body, orelse, ..
            }) => {
                self.walk_expr(test)?;
                self.walk_expr(body)?;
                self.walk_expr(orelse)
            }
            ast::Expr::Dict(ast::ExprDict { keys, values, .. }) => {
                for key in keys.iter().flatten() {
                    self.walk_expr(key)?;
                }
                self.walk_exprs(values)
            }
            ast::Expr::Set(ast::ExprSet { elts, .. }) => self.walk_exprs(elts),
            ast::Expr::List(ast::ExprList { elts, .. }) => self.walk_exprs(elts),
            ast::Expr::Tuple(ast::ExprTuple { elts, .. }) => self.walk_exprs(elts),
            ast::Expr::ListComp(ast::ExprListComp {
                elt, generators, ..
            })
            | ast::Expr::SetComp(ast::ExprSetComp {
                elt, generators, ..
            })
            | ast::Expr::GeneratorExp(ast::ExprGeneratorExp {
                elt, generators, ..
            }) => {
                self.walk_expr(elt)?;
                self.walk_comprehensions(generators)
            }
            ast::Expr::DictComp(ast::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                self.walk_expr(key)?;
                self.walk_expr(value)?;
                self.walk_comprehensions(generators)
            }
            ast::Expr::Await(ast::ExprAwait { value, .. })
            | ast::Expr::YieldFrom(ast::ExprYieldFrom { value, .. })
            | ast::Expr::Starred(ast::ExprStarred { value, .. }) => self.walk_expr(value),
            ast::Expr::Yield(ast::ExprYield { value, .. }) => self.walk_opt_expr(value.as_deref()),
            ast::Expr::Compare(ast::ExprCompare {
                left, comparators, ..
            }) => {
                self.walk_expr(left)?;
                self.walk_exprs(comparators)
            }
            ast::Expr::FormattedValue(ast::ExprFormattedValue {
                value, format_spec, ..
            }) => {
                self.walk_expr(value)?;
                self.walk_opt_expr(format_spec.as_deref())
            }
            ast::Expr::JoinedStr(ast::ExprJoinedStr { values, .. }) => self.walk_exprs(values),
            ast::Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.walk_expr(value)?;
                self.walk_expr(slice)
            }
            ast::Expr::Slice(ast::ExprSlice {
                lower, upper, step, ..
            }) => {
                self.walk_opt_expr(lower.as_deref())?;
                self.walk_opt_expr(upper.as_deref())?;
                self.walk_opt_expr(step.as_deref())
            }
            ast::Expr::Name(_) | ast::Expr::Constant(_) => Ok(()),
            _ => Ok(()),
        }
    }

    fn walk_comprehensions(
        &self,
        generators: &[ast::Comprehension],
    ) -> Result<(), SandboxFailure> {
        for generator in generators {
            self.walk_expr(&generator.target)?;
            self.walk_expr(&generator.iter)?;
            self.walk_exprs(&generator.ifs)?;
        }
        Ok(())
    }

    fn walk_arguments(&self, args: &ast::Arguments) -> Result<(), SandboxFailure> {
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            self.walk_opt_expr(arg.default.as_deref())?;
            self.walk_opt_expr(arg.def.annotation.as_deref())?;
        }
        for arg in args.vararg.iter().chain(&args.kwarg) {
            self.walk_opt_expr(arg.annotation.as_deref())?;
        }
        Ok(())
    }

    #[allow(unreachable_patterns)]
    fn walk_pattern(&self, pattern: &ast::Pattern) -> Result<(), SandboxFailure> {
        match pattern {
            ast::Pattern::MatchValue(ast::PatternMatchValue { value, .. }) => {
                self.walk_expr(value)
            }
            ast::Pattern::MatchMapping(ast::PatternMatchMapping { keys, patterns, .. }) => {
                self.walk_exprs(keys)?;
                for pattern in patterns {
                    self.walk_pattern(pattern)?;
                }
                Ok(())
            }
            ast::Pattern::MatchClass(ast::PatternMatchClass {
                cls,
                patterns,
                kwd_patterns,
                ..
            }) => {
                self.walk_expr(cls)?;
                for pattern in patterns.iter().chain(kwd_patterns) {
                    self.walk_pattern(pattern)?;
                }
                Ok(())
            }
            ast::Pattern::MatchSequence(ast::PatternMatchSequence { patterns, .. })
            | ast::Pattern::MatchOr(ast::PatternMatchOr { patterns, .. }) => {
                for pattern in patterns {
                    self.walk_pattern(pattern)?;
                }
                Ok(())
            }
            ast::Pattern::MatchAs(ast::PatternMatchAs { pattern, .. }) => match pattern {
                Some(pattern) => self.walk_pattern(pattern),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn reject_kind(source: &str) -> FailureKind {
        classify(source, &SafetyPolicy::default())
            .into_rejection()
            .expect("source should be rejected")
            .kind
    }

    #[test]
    fn test_benign_code_is_allowed() {
        let source = "x = [i * i for i in range(10)]\nprint(sum(x))";
        assert!(classify(source, &SafetyPolicy::default()).allowed());
    }

    #[test]
    fn test_import_is_rejected() {
        assert_eq!(reject_kind("import os"), FailureKind::ForbiddenConstruct);
        assert_eq!(
            reject_kind("from subprocess import run"),
            FailureKind::ForbiddenConstruct
        );
    }

    #[test]
    fn test_each_forbidden_call_is_rejected() {
        for name in FORBIDDEN_CALLS {
            let source = format!("{}('x')", name);
            assert_eq!(
                reject_kind(&source),
                FailureKind::ForbiddenConstruct,
                "call to {} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_method_denylist_is_rejected() {
        assert_eq!(
            reject_kind("something.system('ls')"),
            FailureKind::ForbiddenConstruct
        );
        assert_eq!(
            reject_kind("x.popen('ls')"),
            FailureKind::ForbiddenConstruct
        );
    }

    #[test]
    fn test_attribute_denylist_is_rejected() {
        assert_eq!(reject_kind("().__class__"), FailureKind::ForbiddenConstruct);
        assert_eq!(
            reject_kind("x = int.__bases__"),
            FailureKind::ForbiddenConstruct
        );
        assert_eq!(
            reject_kind("object.__subclasses__()"),
            FailureKind::ForbiddenConstruct
        );
    }

    #[test]
    fn test_unparseable_source_is_a_syntax_error() {
        assert_eq!(reject_kind("def f(:"), FailureKind::SyntaxError);
        assert_eq!(reject_kind("x ==== 1"), FailureKind::SyntaxError);
    }

    #[test]
    fn test_denylisted_name_inside_string_is_allowed() {
        // Only call/attribute nodes count, not text.
        let source = "note = 'you could eval this'\nprint(note)";
        assert!(classify(source, &SafetyPolicy::default()).allowed());
    }

    #[test]
    fn test_rejection_reaches_nested_scopes() {
        assert_eq!(
            reject_kind("def f():\n    return eval('1')"),
            FailureKind::ForbiddenConstruct
        );
        assert_eq!(
            reject_kind("xs = [open(p) for p in paths]"),
            FailureKind::ForbiddenConstruct
        );
        assert_eq!(
            reject_kind("g = lambda: __import__('os')"),
            FailureKind::ForbiddenConstruct
        );
        assert_eq!(
            reject_kind("if True:\n    pass\nelse:\n    exec('1')"),
            FailureKind::ForbiddenConstruct
        );
    }

    #[test]
    fn test_later_statements_are_still_checked() {
        // The walk covers the whole suite, not just the first statement.
        let source = "x = 1\ny = 2\nimport os";
        assert_eq!(reject_kind(source), FailureKind::ForbiddenConstruct);
    }

    #[test]
    fn test_rejection_reason_names_the_construct() {
        let failure = classify("eval('1')", &SafetyPolicy::default())
            .into_rejection()
            .unwrap();
        assert!(failure.message.contains("eval"), "got: {}", failure.message);
    }

    #[test]
    fn test_policy_tables() {
        let policy = SafetyPolicy::default();
        assert!(policy.is_forbidden_call("exec"));
        assert!(policy.is_forbidden_call("__import__"));
        assert!(!policy.is_forbidden_call("print"));
        assert!(policy.is_forbidden_method("system"));
        assert!(!policy.is_forbidden_method("append"));
        assert!(policy.is_forbidden_attribute("__class__"));
        assert!(!policy.is_forbidden_attribute("real"));
    }

    #[test]
    fn test_classifier_has_no_side_effects() {
        // Classifying twice yields the same verdict; nothing is cached or mutated.
        let policy = SafetyPolicy::default();
        let first = classify("x = 1", &policy);
        let second = classify("x = 1", &policy);
        assert_eq!(first, second);
        assert!(first.allowed());
    }
}
