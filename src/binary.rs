// mathvm Binary Bytecode Format
// Compiled programs saved as .mvmc files

use crate::ast::VarType;
use crate::compiler::{
    Bytecode, Code, ConstantPool, Function, NativePool, NativeSignature, TopLevelVar,
};

const MAGIC: &[u8; 4] = b"MVMC";
const VERSION: u8 = 1;

pub fn serialize(code: &Code) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend_from_slice(MAGIC);
    out.push(VERSION);

    write_u32(&mut out, code.constants.len() as u32);
    for constant in code.constants.iter() {
        write_string(&mut out, constant);
    }

    write_u32(&mut out, code.natives.len() as u32);
    for native in code.natives.iter() {
        write_string(&mut out, &native.name);
        write_type(&mut out, native.signature.return_type);
        write_u32(&mut out, native.signature.params.len() as u32);
        for ty in &native.signature.params {
            write_type(&mut out, *ty);
        }
    }

    write_u32(&mut out, code.functions.len() as u32);
    for function in &code.functions {
        serialize_function(&mut out, function);
    }

    write_u32(&mut out, code.top_level_vars.len() as u32);
    for var in &code.top_level_vars {
        write_string(&mut out, &var.name);
        write_type(&mut out, var.ty);
        write_u16(&mut out, var.slot);
    }

    out
}

pub fn deserialize(data: &[u8]) -> Result<Code, String> {
    let mut cursor = 0;

    if data.len() < 5 {
        return Err("Invalid file: too short".to_string());
    }
    if &data[0..4] != MAGIC {
        return Err("Invalid file: not a .mvmc file".to_string());
    }
    cursor += 4;

    let version = data[cursor];
    if version != VERSION {
        return Err(format!("Unsupported version: {}", version));
    }
    cursor += 1;

    let constant_count = read_u32(data, &mut cursor)? as usize;
    let mut strings = Vec::with_capacity(constant_count.min(data.len()));
    for _ in 0..constant_count {
        strings.push(read_string(data, &mut cursor)?);
    }
    let constants = ConstantPool::from_strings(strings)?;

    let native_count = read_u32(data, &mut cursor)? as usize;
    let mut natives = NativePool::new();
    for index in 0..native_count {
        let name = read_string(data, &mut cursor)?;
        let return_type = read_type(data, &mut cursor)?;
        let param_count = read_u32(data, &mut cursor)? as usize;
        let mut params = Vec::with_capacity(param_count.min(data.len()));
        for _ in 0..param_count {
            params.push(read_type(data, &mut cursor)?);
        }
        let id = natives
            .register(&name, NativeSignature::new(return_type, params))
            .ok_or("Invalid file: too many natives")?;
        if id as usize != index {
            return Err(format!("Invalid file: duplicate native '{}'", name));
        }
    }

    let function_count = read_u32(data, &mut cursor)? as usize;
    let mut functions = Vec::with_capacity(function_count.min(data.len()));
    for index in 0..function_count {
        let function = deserialize_function(data, &mut cursor)?;
        if function.id as usize != index {
            return Err(format!(
                "Invalid file: function '{}' has id {} at position {}",
                function.name, function.id, index
            ));
        }
        if let Some(native) = function.native {
            if natives.get(native).is_none() {
                return Err(format!("Invalid file: unknown native id {}", native));
            }
        }
        functions.push(function);
    }
    if functions.is_empty() {
        return Err("Invalid file: no functions".to_string());
    }

    let var_count = read_u32(data, &mut cursor)? as usize;
    let mut top_level_vars = Vec::with_capacity(var_count.min(data.len()));
    for _ in 0..var_count {
        let name = read_string(data, &mut cursor)?;
        let ty = read_type(data, &mut cursor)?;
        let slot = read_u16(data, &mut cursor)?;
        top_level_vars.push(TopLevelVar { name, ty, slot });
    }

    if cursor != data.len() {
        return Err("Invalid file: trailing data".to_string());
    }

    Ok(Code::new(functions, constants, natives, top_level_vars))
}

fn serialize_function(out: &mut Vec<u8>, function: &Function) {
    write_u16(out, function.id);
    write_string(out, &function.name);
    write_type(out, function.return_type);

    write_u32(out, function.params.len() as u32);
    for (ty, name) in &function.params {
        write_type(out, *ty);
        write_string(out, name);
    }

    write_u32(out, function.locals.len() as u32);
    for ty in &function.locals {
        write_type(out, *ty);
    }

    match function.native {
        Some(id) => {
            out.push(1);
            write_u16(out, id);
        }
        None => out.push(0),
    }

    let bytes = function.bytecode.as_bytes();
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn deserialize_function(data: &[u8], cursor: &mut usize) -> Result<Function, String> {
    let id = read_u16(data, cursor)?;
    let name = read_string(data, cursor)?;
    let return_type = read_type(data, cursor)?;
    let mut function = Function::new(id, name, return_type);

    let param_count = read_u32(data, cursor)? as usize;
    for _ in 0..param_count {
        let ty = read_type(data, cursor)?;
        let name = read_string(data, cursor)?;
        function.params.push((ty, name));
    }

    let local_count = read_u32(data, cursor)? as usize;
    for _ in 0..local_count {
        function.locals.push(read_type(data, cursor)?);
    }
    if function.locals.len() < function.params.len() {
        return Err(format!(
            "Invalid file: function '{}' has fewer slots than parameters",
            function.name
        ));
    }

    function.native = match read_u8(data, cursor)? {
        0 => None,
        1 => Some(read_u16(data, cursor)?),
        other => return Err(format!("Invalid file: bad native flag {}", other)),
    };

    let code_len = read_u32(data, cursor)? as usize;
    if *cursor + code_len > data.len() {
        return Err("Invalid file: truncated code".to_string());
    }
    function.bytecode = Bytecode::from_bytes(data[*cursor..*cursor + code_len].to_vec());
    *cursor += code_len;

    Ok(function)
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_type(out: &mut Vec<u8>, ty: VarType) {
    out.push(ty.to_byte());
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8, String> {
    let byte = *data.get(*cursor).ok_or("Unexpected end of file")?;
    *cursor += 1;
    Ok(byte)
}

fn read_u16(data: &[u8], cursor: &mut usize) -> Result<u16, String> {
    let bytes = data
        .get(*cursor..*cursor + 2)
        .ok_or("Unexpected end of file")?;
    *cursor += 2;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, String> {
    let bytes = data
        .get(*cursor..*cursor + 4)
        .ok_or("Unexpected end of file")?;
    *cursor += 4;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_type(data: &[u8], cursor: &mut usize) -> Result<VarType, String> {
    let byte = read_u8(data, cursor)?;
    VarType::from_byte(byte).ok_or_else(|| format!("Invalid file: unknown type tag {}", byte))
}

fn read_string(data: &[u8], cursor: &mut usize) -> Result<String, String> {
    let len = read_u32(data, cursor)? as usize;
    if *cursor + len > data.len() {
        return Err("Unexpected end of file".to_string());
    }
    let s = String::from_utf8(data[*cursor..*cursor + len].to_vec())
        .map_err(|_| "Invalid UTF-8 string")?;
    *cursor += len;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Opcode;

    fn sample() -> Code {
        let mut constants = ConstantPool::new();
        let greeting = constants.intern("hi").unwrap();
        let mut natives = NativePool::new();
        natives
            .register("sqrt", NativeSignature::new(VarType::Double, vec![VarType::Double]))
            .unwrap();

        let mut top = Function::new(0, "<top>", VarType::Void);
        top.locals = vec![VarType::String];
        top.bytecode.emit(Opcode::SLoad);
        top.bytecode.emit_u16(greeting);
        top.bytecode.emit(Opcode::StoreSVar);
        top.bytecode.emit_u16(0);
        top.bytecode.emit(Opcode::Stop);

        let mut sqrt = Function::new(1, "sqrt", VarType::Double);
        sqrt.params.push((VarType::Double, "x".to_string()));
        sqrt.locals.push(VarType::Double);
        sqrt.native = Some(0);
        sqrt.bytecode.emit(Opcode::CallNative);
        sqrt.bytecode.emit_u16(0);
        sqrt.bytecode.emit(Opcode::Return);

        let vars = vec![TopLevelVar {
            name: "s".to_string(),
            ty: VarType::String,
            slot: 0,
        }];
        Code::new(vec![top, sqrt], constants, natives, vars)
    }

    #[test]
    fn test_round_trip() {
        let code = sample();
        let bytes = serialize(&code);
        assert_eq!(&bytes[0..4], b"MVMC");
        assert_eq!(deserialize(&bytes).unwrap(), code);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(deserialize(b"MV").is_err());
        assert!(deserialize(b"SALD\x01rest").is_err());

        let mut bytes = serialize(&sample());
        bytes[4] = 99;
        assert!(deserialize(&bytes).unwrap_err().contains("Unsupported version"));

        let bytes = serialize(&sample());
        assert!(deserialize(&bytes[..bytes.len() - 3]).is_err());
    }
}
