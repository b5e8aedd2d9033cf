use serde::{Deserialize, Serialize};

/// Width/signedness class of a scalar memory access. Shared between the
/// type model, the code generator (load/store ops) and the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Ptr,
}

impl ScalarKind {
    pub fn size(self) -> u32 {
        match self {
            ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 | ScalarKind::Ptr => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }
}

/// Index into the semantic analyzer's struct table. Aggregate identity is
/// nominal: two distinct declarations never compare equal, even with
/// identical field lists.
pub type StructId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    /// Integer of 1/2/4/8 bytes (`char`/`short`/`int`/`long`).
    Int { size: u8, unsigned: bool },
    /// Floating point of 4/8 bytes (`float`/`double`).
    Float { size: u8 },
    Ptr(Box<Type>),
    Array(Box<Type>, u32),
    Func(Box<FuncType>),
    Struct(StructId),
    /// Placeholder assigned to ill-typed expressions so analysis can keep
    /// going without cascading follow-on errors.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub ret: Type,
    pub params: Vec<Type>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<Field>,
    pub size: u32,
    pub align: u32,
}

impl StructDef {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// All struct/union definitions of one translation unit, in declaration
/// order. Owned by the analyzer's output and read by the code generator.
#[derive(Debug, Clone, Default)]
pub struct StructTable {
    pub defs: Vec<StructDef>,
}

impl StructTable {
    pub fn get(&self, id: StructId) -> &StructDef {
        &self.defs[id]
    }
}

impl Type {
    pub fn char_() -> Type {
        Type::Int { size: 1, unsigned: false }
    }

    pub fn short_() -> Type {
        Type::Int { size: 2, unsigned: false }
    }

    pub fn int_() -> Type {
        Type::Int { size: 4, unsigned: false }
    }

    pub fn long_() -> Type {
        Type::Int { size: 8, unsigned: false }
    }

    pub fn float_() -> Type {
        Type::Float { size: 4 }
    }

    pub fn double_() -> Type {
        Type::Float { size: 8 }
    }

    pub fn ptr(base: Type) -> Type {
        Type::Ptr(Box::new(base))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// Scalar values usable in conditions and as VM stack operands.
    pub fn is_scalar(&self) -> bool {
        self.is_numeric() || self.is_pointer()
    }

    /// The pointed-to or element type, for pointers and arrays.
    pub fn base(&self) -> Option<&Type> {
        match self {
            Type::Ptr(base) => Some(base),
            Type::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    /// Arrays decay to pointers to their element type in expression
    /// context, as required by C.
    pub fn decay(&self) -> Type {
        match self {
            Type::Array(elem, _) => Type::ptr((**elem).clone()),
            other => other.clone(),
        }
    }

    pub fn size(&self, structs: &StructTable) -> u32 {
        match self {
            Type::Void | Type::Error => 1,
            Type::Int { size, .. } => *size as u32,
            Type::Float { size } => *size as u32,
            Type::Ptr(_) | Type::Func(_) => 8,
            Type::Array(elem, len) => elem.size(structs) * len,
            Type::Struct(id) => structs.get(*id).size,
        }
    }

    pub fn align(&self, structs: &StructTable) -> u32 {
        match self {
            Type::Void | Type::Error => 1,
            Type::Int { size, .. } => *size as u32,
            Type::Float { size } => *size as u32,
            Type::Ptr(_) | Type::Func(_) => 8,
            Type::Array(elem, _) => elem.align(structs),
            Type::Struct(id) => structs.get(*id).align,
        }
    }

    /// Memory access class for scalar loads and stores.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Type::Int { size: 1, unsigned: false } => Some(ScalarKind::I8),
            Type::Int { size: 1, unsigned: true } => Some(ScalarKind::U8),
            Type::Int { size: 2, unsigned: false } => Some(ScalarKind::I16),
            Type::Int { size: 2, unsigned: true } => Some(ScalarKind::U16),
            Type::Int { size: 4, unsigned: false } => Some(ScalarKind::I32),
            Type::Int { size: 4, unsigned: true } => Some(ScalarKind::U32),
            Type::Int { size: 8, unsigned: false } => Some(ScalarKind::I64),
            Type::Int { size: 8, unsigned: true } => Some(ScalarKind::U64),
            Type::Float { size: 4 } => Some(ScalarKind::F32),
            Type::Float { size: 8 } => Some(ScalarKind::F64),
            Type::Ptr(_) => Some(ScalarKind::Ptr),
            _ => None,
        }
    }
}

/// Integer promotion: anything narrower than `int` is widened to `int`
/// before arithmetic.
pub fn integer_promotion(ty: &Type) -> Type {
    match ty {
        Type::Int { size, .. } if *size < 4 => Type::int_(),
        other => other.clone(),
    }
}

/// The usual arithmetic conversions: the fixed promotion ladder applied at
/// every binary-operator site. Narrower integer -> wider integer -> float ->
/// double; same-width mixed signedness converts to unsigned. Pointer
/// operands win outright (pointer arithmetic). Error types propagate.
pub fn common_type(lhs: &Type, rhs: &Type) -> Type {
    if lhs.is_error() || rhs.is_error() {
        return Type::Error;
    }

    if let Some(base) = lhs.base() {
        return Type::ptr(base.clone());
    }
    if let Some(base) = rhs.base() {
        return Type::ptr(base.clone());
    }

    if lhs == &Type::double_() || rhs == &Type::double_() {
        return Type::double_();
    }
    if lhs == &Type::float_() || rhs == &Type::float_() {
        return Type::float_();
    }

    let lhs = integer_promotion(lhs);
    let rhs = integer_promotion(rhs);

    match (&lhs, &rhs) {
        (
            Type::Int { size: ls, unsigned: lu },
            Type::Int { size: rs, unsigned: ru },
        ) => {
            if ls != rs {
                if ls > rs { lhs.clone() } else { rhs.clone() }
            } else {
                Type::Int {
                    size: *ls,
                    unsigned: *lu || *ru,
                }
            }
        }
        _ => Type::Error,
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int { size, unsigned } => {
                if *unsigned {
                    write!(f, "unsigned ")?;
                }
                match size {
                    1 => write!(f, "char"),
                    2 => write!(f, "short"),
                    4 => write!(f, "int"),
                    _ => write!(f, "long"),
                }
            }
            Type::Float { size: 4 } => write!(f, "float"),
            Type::Float { .. } => write!(f, "double"),
            Type::Ptr(base) => write!(f, "{} *", base),
            Type::Array(elem, len) => write!(f, "{} [{}]", elem, len),
            Type::Func(func) => {
                write!(f, "{} (", func.ret)?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Type::Struct(id) => write!(f, "struct #{}", id),
            Type::Error => write!(f, "<error>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        let structs = StructTable::default();
        assert_eq!(Type::char_().size(&structs), 1);
        assert_eq!(Type::int_().size(&structs), 4);
        assert_eq!(Type::long_().size(&structs), 8);
        assert_eq!(Type::ptr(Type::char_()).size(&structs), 8);
        assert_eq!(Type::Array(Box::new(Type::int_()), 10).size(&structs), 40);
    }

    #[test]
    fn test_promotion_ladder() {
        // narrower int -> wider int
        assert_eq!(common_type(&Type::char_(), &Type::int_()), Type::int_());
        assert_eq!(common_type(&Type::int_(), &Type::long_()), Type::long_());
        // int -> floating
        assert_eq!(common_type(&Type::int_(), &Type::double_()), Type::double_());
        assert_eq!(common_type(&Type::long_(), &Type::float_()), Type::float_());
        // float -> double
        assert_eq!(common_type(&Type::float_(), &Type::double_()), Type::double_());
    }

    #[test]
    fn test_char_char_promotes_to_int() {
        assert_eq!(common_type(&Type::char_(), &Type::char_()), Type::int_());
    }

    #[test]
    fn test_mixed_signedness_same_width() {
        let u = Type::Int { size: 4, unsigned: true };
        assert_eq!(common_type(&Type::int_(), &u), u);
    }

    #[test]
    fn test_pointer_wins() {
        let p = Type::ptr(Type::int_());
        assert_eq!(common_type(&p, &Type::long_()), p);
    }

    #[test]
    fn test_array_decays_in_common_type() {
        let arr = Type::Array(Box::new(Type::int_()), 4);
        assert_eq!(common_type(&arr, &Type::int_()), Type::ptr(Type::int_()));
    }

    #[test]
    fn test_error_propagates() {
        assert_eq!(common_type(&Type::Error, &Type::int_()), Type::Error);
    }

    #[test]
    fn test_scalar_kind() {
        assert_eq!(Type::char_().scalar_kind(), Some(ScalarKind::I8));
        assert_eq!(Type::double_().scalar_kind(), Some(ScalarKind::F64));
        assert_eq!(Type::ptr(Type::Void).scalar_kind(), Some(ScalarKind::Ptr));
        assert_eq!(Type::Void.scalar_kind(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::int_().to_string(), "int");
        assert_eq!(Type::ptr(Type::char_()).to_string(), "char *");
        let u = Type::Int { size: 4, unsigned: true };
        assert_eq!(u.to_string(), "unsigned int");
    }
}
