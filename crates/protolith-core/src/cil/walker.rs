//! Single-pass abstract interpreter over one method body.
//!
//! [`MethodWalker`] runs through the instruction list exactly once, in raw
//! order, keeping an abstract evaluation stack. Branches are never followed:
//! generated (de)serialization code is straight-line, so a linear pass sees
//! every call and store in source order.

use super::opcode::OpCode;
use crate::error::{Error, Result};
use crate::metadata::{FieldRef, Instruction, MethodDef, MethodRef, Operand};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::iter::FusedIterator;
use std::rc::Rc;
use std::str::FromStr;
use tracing::trace;

/// Method whose integer arguments are appended to the written-bytes buffer
const RAW_TAG_WRITER: &str = "WriteRawTag";

/// Arrays longer than this are not materialized element by element
const MAX_TRACKED_ARRAY: usize = 4096;

/// Shared contents of an array allocated by the walked method
pub type ArrayCells = Rc<RefCell<Vec<Value>>>;

/// Abstract value on the evaluation stack
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer constant
    Int(i64),
    /// Floating point constant
    Float(f64),
    /// String literal
    Str(String),
    /// `null`
    Null,
    /// The implicit `this` argument
    This,
    /// Method argument by IL index
    Arg(u16),
    /// Local variable that was never assigned in this body
    Local(u16),
    /// Value loaded from a field
    Field {
        /// Instance the field was read from, `None` for static fields
        owner: Option<Box<Value>>,
        /// The field
        field: FieldRef,
    },
    /// Return value of a call
    Returned(Box<CallInfo>),
    /// Object created by `newobj`
    Object {
        /// Type being constructed
        type_name: String,
        /// Constructor arguments
        arguments: Vec<Value>,
    },
    /// Array allocated by this method
    Array(ArrayCells),
    /// Element of an array whose contents are unknown here
    Element {
        /// The array expression
        array: Box<Value>,
        /// The index expression
        index: Box<Value>,
    },
    /// Metadata token (`ldtoken`, `ldftn`)
    Token(String),
    /// Anything the walker does not model
    Unknown,
}

impl Value {
    /// Returns the integer constant, if this is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string literal, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements of a locally built array of string literals
    pub fn string_elements(&self) -> Option<Vec<String>> {
        match self {
            Value::Array(cells) => cells
                .borrow()
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// Returns the constant index of an array element access
    pub fn element_index(&self) -> Option<i64> {
        match self {
            Value::Element { index, .. } => index.as_int(),
            _ => None,
        }
    }

    /// Returns `Name` when this value is the result of a `get_Name()` call
    pub fn getter_name(&self) -> Option<&str> {
        match self {
            Value::Returned(call) => call.method.name.strip_prefix("get_"),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Null => write!(f, "null"),
            Value::This => write!(f, "this"),
            Value::Arg(i) => write!(f, "arg{}", i),
            Value::Local(i) => write!(f, "loc{}", i),
            Value::Field { owner: Some(owner), field } => write!(f, "{}.{}", owner, field.name),
            Value::Field { owner: None, field } => {
                write!(f, "{}::{}", field.declaring_type, field.name)
            }
            Value::Returned(call) => write!(f, "{}", call),
            Value::Object { type_name, .. } => write!(f, "new {}(..)", type_name),
            Value::Array(cells) => write!(f, "array[{}]", cells.borrow().len()),
            Value::Element { array, index } => write!(f, "{}[{}]", array, index),
            Value::Token(t) => write!(f, "token({})", t),
            Value::Unknown => write!(f, "?"),
        }
    }
}

/// A call made by the walked method
#[derive(Debug, Clone, PartialEq)]
pub struct CallInfo {
    /// Called method
    pub method: MethodRef,
    /// Receiver of an instance call
    pub receiver: Option<Value>,
    /// Arguments in declaration order, excluding the receiver
    pub arguments: Vec<Value>,
}

impl CallInfo {
    /// Returns the argument at `index` (receiver excluded)
    pub fn argument(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index)
    }
}

impl fmt::Display for CallInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.receiver {
            Some(receiver) => write!(f, "{}.{}(", receiver, self.method.name)?,
            None => write!(f, "{}(", self.method.qualified_name())?,
        }
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// A field store made by the walked method
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInfo {
    /// Field written to
    pub field: FieldRef,
    /// Instance written to, `None` for static fields
    pub target: Option<Value>,
    /// Stored value
    pub value: Value,
}

/// Event yielded by the walker
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `call`, `callvirt` or `newobj`
    Call(CallInfo),
    /// `stfld` or `stsfld`
    Store(StoreInfo),
}

/// Iterator over the call and store events of one method body
///
/// The first error ends the iteration.
#[derive(Debug)]
pub struct MethodWalker<'a> {
    method: &'a MethodDef,
    context: String,
    position: usize,
    stack: Vec<Value>,
    locals: HashMap<u16, Value>,
    arguments: HashMap<u16, Value>,
    written: Vec<u8>,
    finished: bool,
}

impl<'a> MethodWalker<'a> {
    /// Creates a walker over `method`, declared on the type named `owner`
    pub fn new(owner: &str, method: &'a MethodDef) -> Self {
        Self {
            method,
            context: format!("{}::{}", owner, method.name),
            position: 0,
            stack: Vec::new(),
            locals: HashMap::new(),
            arguments: HashMap::new(),
            written: Vec::new(),
            finished: false,
        }
    }

    /// Returns `Type::Method` of the walked method
    pub fn method_name(&self) -> &str {
        &self.context
    }

    /// Returns the bytes written through raw-tag writer calls so far
    pub fn written_bytes(&self) -> &[u8] {
        &self.written
    }

    fn corrupt(&self, ins: &Instruction, details: impl Into<String>) -> Error {
        Error::corrupt_body(&self.context, ins.offset, details)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self, ins: &Instruction) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| self.corrupt(ins, "stack underflow"))
    }

    fn pop_n(&mut self, ins: &Instruction, count: usize) -> Result<Vec<Value>> {
        if self.stack.len() < count {
            return Err(self.corrupt(
                ins,
                format!(
                    "stack underflow: need {} values, have {}",
                    count,
                    self.stack.len()
                ),
            ));
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }

    fn int_operand(&self, ins: &Instruction) -> Result<i64> {
        match &ins.operand {
            Some(Operand::Int(v)) => Ok(*v),
            _ => Err(self.corrupt(ins, format!("'{}' expects an integer operand", ins.opcode))),
        }
    }

    fn index_operand(&self, ins: &Instruction) -> Result<u16> {
        let value = self.int_operand(ins)?;
        u16::try_from(value).map_err(|_| self.corrupt(ins, format!("index {} out of range", value)))
    }

    fn float_operand(&self, ins: &Instruction) -> Result<f64> {
        match &ins.operand {
            Some(Operand::Float(v)) => Ok(*v),
            Some(Operand::Int(v)) => Ok(*v as f64),
            _ => Err(self.corrupt(ins, format!("'{}' expects a float operand", ins.opcode))),
        }
    }

    fn text_operand<'i>(&self, ins: &'i Instruction) -> Result<&'i str> {
        match &ins.operand {
            Some(Operand::Text(s)) => Ok(s),
            _ => Err(self.corrupt(ins, format!("'{}' expects a string operand", ins.opcode))),
        }
    }

    fn method_operand<'i>(&self, ins: &'i Instruction) -> Result<&'i MethodRef> {
        match &ins.operand {
            Some(Operand::Method(m)) => Ok(m),
            _ => Err(self.corrupt(ins, format!("'{}' expects a method operand", ins.opcode))),
        }
    }

    fn field_operand<'i>(&self, ins: &'i Instruction) -> Result<&'i FieldRef> {
        match &ins.operand {
            Some(Operand::Field(f)) => Ok(f),
            _ => Err(self.corrupt(ins, format!("'{}' expects a field operand", ins.opcode))),
        }
    }

    fn token_operand(&self, ins: &Instruction) -> Result<String> {
        match &ins.operand {
            Some(Operand::Text(s)) => Ok(s.clone()),
            Some(Operand::Method(m)) => Ok(m.qualified_name()),
            Some(Operand::Field(f)) => Ok(format!("{}::{}", f.declaring_type, f.name)),
            _ => Err(self.corrupt(ins, format!("'{}' expects a token operand", ins.opcode))),
        }
    }

    fn load_arg(&self, index: u16) -> Value {
        if let Some(v) = self.arguments.get(&index) {
            return v.clone();
        }
        if !self.method.is_static && index == 0 {
            Value::This
        } else {
            Value::Arg(index)
        }
    }

    fn load_local(&self, index: u16) -> Value {
        self.locals
            .get(&index)
            .cloned()
            .unwrap_or(Value::Local(index))
    }

    fn store_local(&mut self, ins: &Instruction, index: u16) -> Result<()> {
        let value = self.pop(ins)?;
        self.locals.insert(index, value);
        Ok(())
    }

    fn call(&mut self, ins: &Instruction, construct: bool) -> Result<Event> {
        let method = self.method_operand(ins)?;
        let arguments = self.pop_n(ins, method.parameters.len())?;
        let receiver = if method.has_this && !construct {
            Some(self.pop(ins)?)
        } else {
            None
        };

        let info = CallInfo {
            method: method.clone(),
            receiver,
            arguments,
        };

        if construct {
            self.push(Value::Object {
                type_name: method.declaring_type.clone(),
                arguments: info.arguments.clone(),
            });
        } else if method.returns_value() {
            self.push(Value::Returned(Box::new(info.clone())));
        }

        if method.name == RAW_TAG_WRITER {
            self.written
                .extend(info.arguments.iter().filter_map(Value::as_int).map(|b| b as u8));
        }

        trace!("{} IL_{:04x}: {}", self.context, ins.offset, info);
        Ok(Event::Call(info))
    }

    fn store_element(&mut self, ins: &Instruction) -> Result<()> {
        let value = self.pop(ins)?;
        let index = self.pop(ins)?;
        let array = self.pop(ins)?;

        if let (Value::Array(cells), Some(index)) = (&array, index.as_int()) {
            if let Ok(index) = usize::try_from(index) {
                let mut cells = cells.borrow_mut();
                if index >= cells.len() && index < MAX_TRACKED_ARRAY {
                    cells.resize(index + 1, Value::Unknown);
                }
                if let Some(cell) = cells.get_mut(index) {
                    *cell = value;
                }
            }
        }
        Ok(())
    }

    fn load_element(&mut self, ins: &Instruction) -> Result<()> {
        let index = self.pop(ins)?;
        let array = self.pop(ins)?;

        let known = match (&array, index.as_int()) {
            (Value::Array(cells), Some(i)) => usize::try_from(i)
                .ok()
                .and_then(|i| cells.borrow().get(i).cloned()),
            _ => None,
        };
        let element = known.unwrap_or_else(|| Value::Element {
            array: Box::new(array),
            index: Box::new(index),
        });
        self.push(element);
        Ok(())
    }

    fn step(&mut self, ins: &Instruction) -> Result<Option<Event>> {
        let opcode = OpCode::from_str(&ins.opcode)
            .map_err(|_| self.corrupt(ins, format!("unrecognized opcode '{}'", ins.opcode)))?;

        match opcode {
            OpCode::Nop | OpCode::Prefix | OpCode::Br | OpCode::Endfinally | OpCode::Rethrow => {}
            OpCode::Leave => self.stack.clear(),

            OpCode::Ldarg0 => self.push(self.load_arg(0)),
            OpCode::Ldarg1 => self.push(self.load_arg(1)),
            OpCode::Ldarg2 => self.push(self.load_arg(2)),
            OpCode::Ldarg3 => self.push(self.load_arg(3)),
            OpCode::Ldarg | OpCode::Ldarga => {
                let index = self.index_operand(ins)?;
                self.push(self.load_arg(index));
            }
            OpCode::Starg => {
                let index = self.index_operand(ins)?;
                let value = self.pop(ins)?;
                self.arguments.insert(index, value);
            }

            OpCode::Ldloc0 => self.push(self.load_local(0)),
            OpCode::Ldloc1 => self.push(self.load_local(1)),
            OpCode::Ldloc2 => self.push(self.load_local(2)),
            OpCode::Ldloc3 => self.push(self.load_local(3)),
            OpCode::Ldloc | OpCode::Ldloca => {
                let index = self.index_operand(ins)?;
                self.push(self.load_local(index));
            }
            OpCode::Stloc0 => self.store_local(ins, 0)?,
            OpCode::Stloc1 => self.store_local(ins, 1)?,
            OpCode::Stloc2 => self.store_local(ins, 2)?,
            OpCode::Stloc3 => self.store_local(ins, 3)?,
            OpCode::Stloc => {
                let index = self.index_operand(ins)?;
                self.store_local(ins, index)?;
            }

            OpCode::Ldnull => self.push(Value::Null),
            OpCode::LdcI4M1 => self.push(Value::Int(-1)),
            OpCode::LdcI40 => self.push(Value::Int(0)),
            OpCode::LdcI41 => self.push(Value::Int(1)),
            OpCode::LdcI42 => self.push(Value::Int(2)),
            OpCode::LdcI43 => self.push(Value::Int(3)),
            OpCode::LdcI44 => self.push(Value::Int(4)),
            OpCode::LdcI45 => self.push(Value::Int(5)),
            OpCode::LdcI46 => self.push(Value::Int(6)),
            OpCode::LdcI47 => self.push(Value::Int(7)),
            OpCode::LdcI48 => self.push(Value::Int(8)),
            OpCode::LdcInt => {
                let value = self.int_operand(ins)?;
                self.push(Value::Int(value));
            }
            OpCode::LdcFloat => {
                let value = self.float_operand(ins)?;
                self.push(Value::Float(value));
            }
            OpCode::Ldstr => {
                let value = self.text_operand(ins)?.to_string();
                self.push(Value::Str(value));
            }

            OpCode::Dup => {
                let top = self
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| self.corrupt(ins, "stack underflow"))?;
                self.push(top);
            }
            OpCode::Pop | OpCode::BranchUnary | OpCode::Throw | OpCode::Initobj => {
                self.pop(ins)?;
            }
            OpCode::BranchBinary | OpCode::Stind => {
                self.pop_n(ins, 2)?;
            }

            OpCode::Call | OpCode::Callvirt => return self.call(ins, false).map(Some),
            OpCode::Newobj => return self.call(ins, true).map(Some),
            OpCode::Ret => {
                if !self.method.return_type.is_void() {
                    self.pop(ins)?;
                }
            }

            OpCode::Ldfld | OpCode::Ldflda => {
                let field = self.field_operand(ins)?.clone();
                let owner = self.pop(ins)?;
                self.push(Value::Field {
                    owner: Some(Box::new(owner)),
                    field,
                });
            }
            OpCode::Ldsfld | OpCode::Ldsflda => {
                let field = self.field_operand(ins)?.clone();
                self.push(Value::Field { owner: None, field });
            }
            OpCode::Stfld => {
                let field = self.field_operand(ins)?.clone();
                let value = self.pop(ins)?;
                let target = self.pop(ins)?;
                return Ok(Some(Event::Store(StoreInfo {
                    field,
                    target: Some(target),
                    value,
                })));
            }
            OpCode::Stsfld => {
                let field = self.field_operand(ins)?.clone();
                let value = self.pop(ins)?;
                return Ok(Some(Event::Store(StoreInfo {
                    field,
                    target: None,
                    value,
                })));
            }

            OpCode::Newarr => {
                let length = self.pop(ins)?;
                let cells = match length.as_int().and_then(|n| usize::try_from(n).ok()) {
                    Some(n) if n <= MAX_TRACKED_ARRAY => vec![Value::Unknown; n],
                    _ => Vec::new(),
                };
                self.push(Value::Array(Rc::new(RefCell::new(cells))));
            }
            OpCode::Stelem => self.store_element(ins)?,
            OpCode::Ldelem | OpCode::Ldelema => self.load_element(ins)?,
            OpCode::Ldlen | OpCode::Unary | OpCode::Ldind => {
                self.pop(ins)?;
                self.push(Value::Unknown);
            }

            OpCode::Ldtoken | OpCode::Ldftn => {
                let token = self.token_operand(ins)?;
                self.push(Value::Token(token));
            }
            OpCode::Ldvirtftn => {
                let token = self.token_operand(ins)?;
                self.pop(ins)?;
                self.push(Value::Token(token));
            }
            OpCode::Box
            | OpCode::Unbox
            | OpCode::Castclass
            | OpCode::Isinst
            | OpCode::Convert => {
                // The value flows through unchanged for our purposes.
                let value = self.pop(ins)?;
                self.push(value);
            }
            OpCode::Sizeof => self.push(Value::Unknown),
            OpCode::Binary => {
                self.pop_n(ins, 2)?;
                self.push(Value::Unknown);
            }
        }

        Ok(None)
    }
}

impl Iterator for MethodWalker<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let method = self.method;
        while let Some(ins) = method.body.get(self.position) {
            self.position += 1;
            match self.step(ins) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        self.finished = true;
        None
    }
}

impl FusedIterator for MethodWalker<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldRef, Instruction as I, MethodRef, TypeRef};
    use pretty_assertions::assert_eq;

    fn t(name: &str) -> TypeRef {
        TypeRef::new(name)
    }

    fn method(body: Vec<I>) -> MethodDef {
        MethodDef::new("WriteTo", t("System.Void"))
            .with_parameter("output", t("Google.Protobuf.CodedOutputStream"))
            .with_body(body)
    }

    fn events(method: &MethodDef) -> Vec<Event> {
        MethodWalker::new("Test.Foo", method)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_call_arguments_are_resolved() {
        let for_message = MethodRef::new(
            "Google.Protobuf.FieldCodec",
            "ForMessage",
            vec![t("System.UInt32"), t("Google.Protobuf.MessageParser`1")],
            t("Google.Protobuf.FieldCodec`1"),
        );
        let parser = FieldRef::new("Test.Bar", "_parser", t("Google.Protobuf.MessageParser`1"));
        let codec = FieldRef::new("Test.Foo", "_repeated_bars_codec", t("Google.Protobuf.FieldCodec`1"));

        let cctor = MethodDef::static_constructor(vec![]).with_body(vec![
            I::int("ldc.i4.s", 18),
            I::field("ldsfld", parser.clone()),
            I::method("call", for_message.clone()),
            I::field("stsfld", codec.clone()),
            I::op("ret"),
        ]);

        let events = events(&cctor);
        assert_eq!(events.len(), 2);

        let Event::Call(call) = &events[0] else {
            panic!("expected call, got {:?}", events[0]);
        };
        assert_eq!(call.method.name, "ForMessage");
        assert_eq!(call.receiver, None);
        assert_eq!(call.argument(0), Some(&Value::Int(18)));

        let Event::Store(store) = &events[1] else {
            panic!("expected store, got {:?}", events[1]);
        };
        assert_eq!(store.field, codec);
        assert!(matches!(&store.value, Value::Returned(c) if c.method == for_message));
    }

    #[test]
    fn test_string_array_store() {
        let names = FieldRef::new("Test.Foo", "_fooFieldNames", t("System.String[]"));
        let cctor = MethodDef::static_constructor(vec![]).with_body(vec![
            I::op("ldc.i4.2"),
            I::text("newarr", "System.String"),
            I::op("dup"),
            I::op("ldc.i4.0"),
            I::text("ldstr", "id"),
            I::op("stelem.ref"),
            I::op("dup"),
            I::op("ldc.i4.1"),
            I::text("ldstr", "display_name"),
            I::op("stelem.ref"),
            I::field("stsfld", names),
            I::op("ret"),
        ]);

        let events = events(&cctor);
        let [Event::Store(store)] = events.as_slice() else {
            panic!("expected a single store, got {:?}", events);
        };
        assert_eq!(
            store.value.string_elements(),
            Some(vec!["id".to_string(), "display_name".to_string()])
        );
    }

    #[test]
    fn test_getter_argument() {
        let getter = MethodRef::new("Test.Foo", "get_Name", vec![], t("System.String")).instance();
        let writer = MethodRef::new(
            "Google.Protobuf.CodedOutputStream",
            "WriteString",
            vec![t("System.String")],
            t("System.Void"),
        )
        .instance();

        let body = method(vec![
            I::op("ldarg.1"),
            I::op("ldarg.0"),
            I::method("call", getter),
            I::method("callvirt", writer),
            I::op("ret"),
        ]);

        let events = events(&body);
        assert_eq!(events.len(), 2);
        let Event::Call(write) = &events[1] else {
            panic!("expected call");
        };
        assert_eq!(write.receiver, Some(Value::Arg(1)));
        assert_eq!(write.argument(0).and_then(Value::getter_name), Some("Name"));
        assert_eq!(write.to_string(), "arg1.WriteString(this.get_Name())");
    }

    #[test]
    fn test_raw_tag_bytes_are_recorded() {
        let raw = MethodRef::new(
            "Google.Protobuf.CodedOutputStream",
            "WriteRawTag",
            vec![t("System.Byte"), t("System.Byte")],
            t("System.Void"),
        )
        .instance();
        let body = method(vec![
            I::op("ldarg.1"),
            I::int("ldc.i4", 0xAC),
            I::op("ldc.i4.2"),
            I::method("callvirt", raw),
            I::op("ret"),
        ]);

        let mut walker = MethodWalker::new("Test.Foo", &body);
        assert!(matches!(walker.next(), Some(Ok(Event::Call(_)))));
        assert_eq!(walker.written_bytes(), &[0xAC, 0x02]);
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_element_of_unknown_array_through_local() {
        let names = FieldRef::new("Test.Foo", "_fooFieldNames", t("System.String[]"));
        let body = method(vec![
            I::field("ldsfld", names.clone()),
            I::op("stloc.0"),
            I::op("ldloc.0"),
            I::op("ldc.i4.1"),
            I::op("ldelem.ref"),
            I::op("pop"),
            I::op("ret"),
        ]);
        let mut walker = MethodWalker::new("Test.Foo", &body);
        assert!(walker.next().is_none());
        assert!(walker.stack.is_empty());

        // Re-run up to the ldelem and inspect the produced value.
        let partial = method(body.body[..5].to_vec());
        let mut walker = MethodWalker::new("Test.Foo", &partial);
        assert!(walker.next().is_none());
        let top = walker.stack.last().unwrap();
        assert_eq!(top.element_index(), Some(1));
        assert!(matches!(top, Value::Element { array, .. }
            if matches!(array.as_ref(), Value::Field { field, .. } if *field == names)));
    }

    #[test]
    fn test_branches_are_not_followed() {
        let getter = MethodRef::new("Test.Foo", "get_HasId", vec![], t("System.Boolean")).instance();
        let body = method(vec![
            I::op("ldarg.0"),
            I::method("call", getter),
            I::int("brfalse.s", 42),
            I::text("ldstr", "after"),
            I::op("pop"),
            I::op("ret"),
        ]);
        let events = events(&body);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_stack_underflow_is_fatal() {
        let body = method(vec![I::op("nop"), I::op("pop"), I::op("ret")]);
        let mut walker = MethodWalker::new("Test.Foo", &body);
        match walker.next() {
            Some(Err(Error::CorruptMethodBody { method, offset, .. })) => {
                assert_eq!(method, "Test.Foo::WriteTo");
                assert_eq!(offset, 1);
            }
            other => panic!("expected corrupt body error, got {:?}", other),
        }
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_unrecognized_opcode_is_fatal() {
        let body = method(vec![I::op("calli")]);
        let err = MethodWalker::new("Test.Foo", &body)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(err.to_string().contains("unrecognized opcode 'calli'"));
    }

    #[test]
    fn test_missing_operand_is_fatal() {
        let body = method(vec![I::op("ldstr")]);
        let err = MethodWalker::new("Test.Foo", &body)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, Error::CorruptMethodBody { .. }));
    }
}
