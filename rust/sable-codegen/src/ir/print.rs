//! Textual IR dump, loosely following LLVM assembly syntax.

use std::fmt::{self, Write};

use super::function::{Function, InstKind, Linkage, Value, ValueDef};
use super::module::Module;

/// Formats a function, resolving function addresses through `module` if given.
pub struct FunctionPrinter<'a> {
    func: &'a Function,
    module: Option<&'a Module>,
}

impl<'a> FunctionPrinter<'a> {
    pub fn new(func: &'a Function, module: Option<&'a Module>) -> Self {
        Self { func, module }
    }

    fn value(&self, v: Value) -> String {
        let data = self.func.value(v);
        match &data.def {
            ValueDef::IntConst(n) => n.to_string(),
            ValueDef::FloatConst(x) => format!("{x:?}"),
            ValueDef::Undef => "undef".to_string(),
            ValueDef::FuncAddr(fref) => match self.module {
                Some(m) => format!("@{}", m.function(*fref).name),
                None => format!("@f{}", fref.index()),
            },
            ValueDef::Param(_) | ValueDef::Result(_) => match &data.name {
                Some(name) => format!("%{name}.{}", v.index()),
                None => format!("%{}", v.index()),
            },
        }
    }

    fn typed(&self, v: Value) -> String {
        format!("{} {}", self.func.value_type(v), self.value(v))
    }

    fn inst(&self, kind: &InstKind) -> String {
        let block_name = |b| format!("%{}", self.func.block(b).name);
        match kind {
            InstKind::AllocaPoint => "; alloca point".to_string(),
            InstKind::Alloca { ty, align } => format!("alloca {ty}, align {align}"),
            InstKind::Load { ptr, align } => format!("load {}, align {align}", self.typed(*ptr)),
            InstKind::Store { value, ptr, align } => {
                format!("store {}, {}, align {align}", self.typed(*value), self.typed(*ptr))
            }
            InstKind::FieldAddr {
                base,
                aggregate,
                index,
            } => format!("fieldaddr {aggregate}, {}, {index}", self.typed(*base)),
            InstKind::MemCopy {
                dst,
                src,
                size,
                align,
            } => format!(
                "memcpy {}, {}, {size}, align {align}",
                self.typed(*dst),
                self.typed(*src)
            ),
            InstKind::Unary { op, arg } => {
                format!("{} {}", format!("{op:?}").to_lowercase(), self.typed(*arg))
            }
            InstKind::Binary { op, lhs, rhs } => format!(
                "{} {}, {}",
                format!("{op:?}").to_lowercase(),
                self.typed(*lhs),
                self.value(*rhs)
            ),
            InstKind::IntCompare { pred, lhs, rhs } => format!(
                "icmp {} {}, {}",
                format!("{pred:?}").to_lowercase(),
                self.typed(*lhs),
                self.value(*rhs)
            ),
            InstKind::FloatCompare { pred, lhs, rhs } => format!(
                "fcmp {} {}, {}",
                format!("{pred:?}").to_lowercase(),
                self.typed(*lhs),
                self.value(*rhs)
            ),
            InstKind::ExtractValue { aggregate, index } => {
                format!("extractvalue {}, {index}", self.typed(*aggregate))
            }
            InstKind::InsertValue {
                aggregate,
                value,
                index,
            } => format!(
                "insertvalue {}, {}, {index}",
                self.typed(*aggregate),
                self.typed(*value)
            ),
            InstKind::Call {
                callee,
                sig,
                args,
                attrs,
            } => {
                let mut out = format!("call {} {}(", sig.ret, self.value(*callee));
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.func.value_type(*arg).to_string());
                    for (_, attr) in attrs.iter().filter(|(idx, _)| *idx == i) {
                        let _ = write!(out, " {attr}");
                    }
                    let _ = write!(out, " {}", self.value(*arg));
                }
                out.push(')');
                out
            }
            InstKind::Br { dest } => format!("br label {}", block_name(*dest)),
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            } => format!(
                "br {}, label {}, label {}",
                self.typed(*cond),
                block_name(*then_dest),
                block_name(*else_dest)
            ),
            InstKind::Ret { value: Some(v) } => format!("ret {}", self.typed(*v)),
            InstKind::Ret { value: None } => "ret void".to_string(),
            InstKind::Unreachable => "unreachable".to_string(),
        }
    }
}

impl fmt::Display for FunctionPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        let keyword = if func.is_declaration() { "declare" } else { "define" };
        let linkage = match func.linkage {
            Linkage::Export => "",
            Linkage::Local => "internal ",
        };
        write!(f, "{keyword} {linkage}{} @{}(", func.sig.ret, func.name)?;
        for (i, (param, value)) in func.sig.params.iter().zip(func.params()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.ty)?;
            for attr in &param.attrs {
                write!(f, " {attr}")?;
            }
            write!(f, " {}", self.value(*value))?;
        }
        write!(f, ")")?;
        if func.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for &block in func.layout() {
            let data = func.block(block);
            write!(f, "{}:", data.name)?;
            if !data.preds.is_empty() {
                write!(f, "  ; preds = {}", data.preds.len())?;
            }
            writeln!(f)?;
            for &inst in &data.insts {
                let inst_data = func.inst(inst);
                match inst_data.result {
                    Some(v) => writeln!(f, "  {} = {}", self.value(v), self.inst(&inst_data.kind))?,
                    None => writeln!(f, "  {}", self.inst(&inst_data.kind))?,
                }
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        FunctionPrinter::new(self, None).fmt(f)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (_, func) in self.functions() {
            writeln!(f)?;
            FunctionPrinter::new(func, Some(self)).fmt(f)?;
        }
        Ok(())
    }
}
