//! Builder-style constructors for metadata, for readers that produce the
//! model programmatically instead of through a JSON dump.

use super::{
    Constant, FieldDef, FieldRef, Instruction, MethodDef, MethodRef, Operand, ParameterDef,
    PropertyDef, TypeDef, TypeKind, TypeRef,
};

impl TypeDef {
    /// Creates an empty type definition of the given kind
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            declaring_type: None,
            kind,
            base_type: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Creates an empty class
    pub fn class(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, TypeKind::Class)
    }

    /// Creates an empty enum
    pub fn enumeration(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, TypeKind::Enum)
    }

    /// Marks the type as nested inside `declaring_type`
    pub fn nested_in(mut self, declaring_type: impl Into<String>) -> Self {
        self.declaring_type = Some(declaring_type.into());
        self
    }

    /// Sets the base type
    pub fn extends(mut self, base: TypeRef) -> Self {
        self.base_type = Some(base);
        self
    }

    /// Adds an implemented interface
    pub fn implementing(mut self, interface: TypeRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Adds an instance field
    pub fn with_field(mut self, name: impl Into<String>, field_type: TypeRef) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            is_static: false,
            constant: None,
        });
        self
    }

    /// Adds a static literal field
    pub fn with_constant(
        mut self,
        name: impl Into<String>,
        field_type: TypeRef,
        constant: Constant,
    ) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            is_static: true,
            constant: Some(constant),
        });
        self
    }

    /// Adds an instance property
    pub fn with_property(mut self, name: impl Into<String>, property_type: TypeRef) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            property_type,
            is_static: false,
        });
        self
    }

    /// Adds a static property
    pub fn with_static_property(
        mut self,
        name: impl Into<String>,
        property_type: TypeRef,
    ) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            property_type,
            is_static: true,
        });
        self
    }

    /// Adds a method
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }
}

impl MethodDef {
    /// Creates an instance method without parameters or body
    pub fn new(name: impl Into<String>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            parameters: Vec::new(),
            return_type,
            body: Vec::new(),
        }
    }

    /// Creates a type initializer with the given body
    pub fn static_constructor(body: Vec<Instruction>) -> Self {
        Self {
            name: ".cctor".to_string(),
            is_static: true,
            parameters: Vec::new(),
            return_type: TypeRef::new(super::VOID),
            body,
        }
    }

    /// Adds a parameter
    pub fn with_parameter(mut self, name: impl Into<String>, parameter_type: TypeRef) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            parameter_type,
        });
        self
    }

    /// Sets the body; offsets are renumbered sequentially
    pub fn with_body(mut self, body: Vec<Instruction>) -> Self {
        self.body = body
            .into_iter()
            .enumerate()
            .map(|(i, mut ins)| {
                ins.offset = i as u32;
                ins
            })
            .collect();
        self
    }
}

impl MethodRef {
    /// Creates a reference to a static method
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            parameters,
            return_type,
            has_this: false,
        }
    }

    /// Marks the method as an instance method
    pub fn instance(mut self) -> Self {
        self.has_this = true;
        self
    }
}

impl FieldRef {
    /// Creates a field reference
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        field_type: TypeRef,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            field_type,
        }
    }
}

impl Instruction {
    /// Creates an instruction without operand
    pub fn op(opcode: &str) -> Self {
        Self {
            offset: 0,
            opcode: opcode.to_string(),
            operand: None,
        }
    }

    /// Creates an instruction with an operand
    pub fn with(opcode: &str, operand: Operand) -> Self {
        Self {
            offset: 0,
            opcode: opcode.to_string(),
            operand: Some(operand),
        }
    }

    /// Creates an instruction with an integer operand
    pub fn int(opcode: &str, value: i64) -> Self {
        Self::with(opcode, Operand::Int(value))
    }

    /// Creates an instruction with a text operand
    pub fn text(opcode: &str, value: impl Into<String>) -> Self {
        Self::with(opcode, Operand::Text(value.into()))
    }

    /// Creates a call-like instruction
    pub fn method(opcode: &str, method: MethodRef) -> Self {
        Self::with(opcode, Operand::Method(method))
    }

    /// Creates a field access instruction
    pub fn field(opcode: &str, field: FieldRef) -> Self {
        Self::with(opcode, Operand::Field(field))
    }
}
