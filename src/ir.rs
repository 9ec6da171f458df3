//! Statement/expression IR emitted by the opcode combinators.
//!
//! The tree is built once per decoded instruction and handed to the code
//! generator; nothing here is mutated after construction. Constructors
//! allocate fresh nodes and never touch their inputs.

use serde::{Deserialize, Serialize};

/// Binary operators. Serialized as the operator token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "&")]
    And,
    #[serde(rename = "|")]
    Or,
    #[serde(rename = "^")]
    Xor,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<<")]
    Shl,
    #[serde(rename = ">>")]
    Shr,
}

/// Assignment operators, plain and compound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    #[serde(rename = "=")]
    Set,
    #[serde(rename = "+=")]
    Add,
    #[serde(rename = "-=")]
    Sub,
    #[serde(rename = "&=")]
    And,
    #[serde(rename = "|=")]
    Or,
    #[serde(rename = "^=")]
    Xor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Expr {
    /// Signed integer constant, 8- or 16-bit range depending on context.
    Literal { value: i32 },
    /// Named symbol in the target namespace (`pc`, `sp`, `tstates`, `SZP_TABLE`, ...).
    Identifier { name: String },
    /// 8-bit CPU register, canonical lowercase name (`a`..`l`, `f`).
    Register { name: String },
    /// Computed (bracket-style) indexing, e.g. `SZP_TABLE[a]`.
    Index {
        object: Box<Expr>,
        property: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Call into the host runtime. The callee is always a bare identifier.
    Call { callee: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Stmt {
    Expr { expr: Expr },
    If {
        test: Expr,
        then: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        otherwise: Vec<Stmt>,
    },
    Block { body: Vec<Stmt> },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
    },
}

impl Expr {
    pub fn lit(value: i32) -> Self {
        Expr::Literal { value }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier { name: name.into() }
    }

    /// Register names are single canonical lowercase identifiers.
    pub fn reg(name: impl Into<String>) -> Self {
        let name = name.into();
        debug_assert!(
            name.chars().all(|c| c.is_ascii_lowercase()),
            "register name must be lowercase: {name}"
        );
        Expr::Register { name }
    }

    pub fn index(object: Expr, property: Expr) -> Self {
        Expr::Index {
            object: Box::new(object),
            property: Box::new(property),
        }
    }

    pub fn bin(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn assign(op: AssignOp, left: Expr, right: Expr) -> Self {
        Expr::Assign {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }

    /// Call with no arguments.
    pub fn call0(callee: impl Into<String>) -> Self {
        Expr::call(callee, Vec::new())
    }

    /// Call with a single argument, wrapped as a one-element list.
    pub fn call1(callee: impl Into<String>, arg: Expr) -> Self {
        Expr::call(callee, vec![arg])
    }
}

impl Stmt {
    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr { expr }
    }

    pub fn if_then(test: Expr, then: Vec<Stmt>) -> Self {
        Stmt::If {
            test,
            then,
            otherwise: Vec::new(),
        }
    }

    pub fn if_else(test: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Self {
        Stmt::If {
            test,
            then,
            otherwise,
        }
    }

    pub fn block(body: Vec<Stmt>) -> Self {
        Stmt::Block { body }
    }

    pub fn ret() -> Self {
        Stmt::Return { value: None }
    }

    pub fn ret_value(value: Expr) -> Self {
        Stmt::Return { value: Some(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_build_expected_shapes() {
        let e = Expr::assign(
            AssignOp::Set,
            Expr::ident("pc"),
            Expr::bin(BinOp::Add, Expr::reg("a"), Expr::lit(1)),
        );
        match e {
            Expr::Assign { op, left, right } => {
                assert_eq!(op, AssignOp::Set);
                assert_eq!(*left, Expr::ident("pc"));
                assert!(matches!(*right, Expr::Binary { op: BinOp::Add, .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn call1_wraps_single_argument() {
        let call = Expr::call1("readMem", Expr::lit(0x1234));
        match call {
            Expr::Call { callee, args } => {
                assert_eq!(callee, "readMem");
                assert_eq!(args, vec![Expr::lit(0x1234)]);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn if_statement_defaults_to_empty_alternate() {
        let stmt = Stmt::if_then(Expr::lit(1), vec![Stmt::ret()]);
        match stmt {
            Stmt::If { otherwise, .. } => assert!(otherwise.is_empty()),
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn serializes_with_type_tags_and_operator_tokens() {
        let stmt = Stmt::expr(Expr::assign(
            AssignOp::Sub,
            Expr::ident("tstates"),
            Expr::lit(5),
        ));
        let json = serde_json::to_value(&stmt).unwrap();
        assert_eq!(json["type"], "expr");
        assert_eq!(json["expr"]["type"], "assign");
        assert_eq!(json["expr"]["op"], "-=");
    }
}
