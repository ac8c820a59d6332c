// mathvm Bytecode Instructions

/// Bytecode operation codes
///
/// "upper" is the top of the operand stack, "lower" the value right beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Invalid = 0, // Never emitted; a zeroed buffer does not decode

    // Constants
    DLoad,   // Push inline f64
    ILoad,   // Push inline i64
    SLoad,   // Push string constant, u16 id
    DLoad0,  // Push 0.0
    ILoad0,  // Push 0
    SLoad0,  // Push ""
    DLoad1,  // Push 1.0
    ILoad1,  // Push 1
    DLoadM1, // Push -1.0
    ILoadM1, // Push -1

    // Arithmetic
    DAdd,
    IAdd,
    DSub, // upper - lower
    ISub, // upper - lower
    DMul,
    IMul,
    DDiv, // upper / lower
    IDiv, // upper / lower
    IMod, // upper % lower
    DNeg,
    INeg,

    // Bitwise
    IAOr,
    IAAnd,
    IAXor,

    // Output
    IPrint,
    DPrint,
    SPrint,

    // Conversion and stack
    I2D,
    D2I,
    S2I, // String id as int
    Swap,
    Pop,

    // Variables of the current context, u16 slot
    LoadDVar,
    LoadIVar,
    LoadSVar,
    StoreDVar,
    StoreIVar,
    StoreSVar,

    // Variables of any context, u16 context + u16 slot
    LoadCtxDVar,
    LoadCtxIVar,
    LoadCtxSVar,
    StoreCtxDVar,
    StoreCtxIVar,
    StoreCtxSVar,

    // Comparison, pushes cmp(upper, lower) as -1/0/1
    DCmp,
    ICmp,

    // Control flow, i16 displacement
    Ja,
    IfICmpNE,
    IfICmpE,
    IfICmpG,
    IfICmpGE,
    IfICmpL,
    IfICmpLE,

    Dump, // Log TOS without popping
    Stop,

    // Functions
    Call,       // u16 function id
    CallNative, // u16 native id
    Return,
}

impl Opcode {
    /// Every opcode, indexed by its byte value
    pub const ALL: [Opcode; 59] = [
        Opcode::Invalid,
        Opcode::DLoad,
        Opcode::ILoad,
        Opcode::SLoad,
        Opcode::DLoad0,
        Opcode::ILoad0,
        Opcode::SLoad0,
        Opcode::DLoad1,
        Opcode::ILoad1,
        Opcode::DLoadM1,
        Opcode::ILoadM1,
        Opcode::DAdd,
        Opcode::IAdd,
        Opcode::DSub,
        Opcode::ISub,
        Opcode::DMul,
        Opcode::IMul,
        Opcode::DDiv,
        Opcode::IDiv,
        Opcode::IMod,
        Opcode::DNeg,
        Opcode::INeg,
        Opcode::IAOr,
        Opcode::IAAnd,
        Opcode::IAXor,
        Opcode::IPrint,
        Opcode::DPrint,
        Opcode::SPrint,
        Opcode::I2D,
        Opcode::D2I,
        Opcode::S2I,
        Opcode::Swap,
        Opcode::Pop,
        Opcode::LoadDVar,
        Opcode::LoadIVar,
        Opcode::LoadSVar,
        Opcode::StoreDVar,
        Opcode::StoreIVar,
        Opcode::StoreSVar,
        Opcode::LoadCtxDVar,
        Opcode::LoadCtxIVar,
        Opcode::LoadCtxSVar,
        Opcode::StoreCtxDVar,
        Opcode::StoreCtxIVar,
        Opcode::StoreCtxSVar,
        Opcode::DCmp,
        Opcode::ICmp,
        Opcode::Ja,
        Opcode::IfICmpNE,
        Opcode::IfICmpE,
        Opcode::IfICmpG,
        Opcode::IfICmpGE,
        Opcode::IfICmpL,
        Opcode::IfICmpLE,
        Opcode::Dump,
        Opcode::Stop,
        Opcode::Call,
        Opcode::CallNative,
        Opcode::Return,
    ];

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Total instruction length in bytes, opcode included
    pub fn size(&self) -> usize {
        match self {
            Opcode::DLoad | Opcode::ILoad => 9,

            Opcode::LoadCtxDVar
            | Opcode::LoadCtxIVar
            | Opcode::LoadCtxSVar
            | Opcode::StoreCtxDVar
            | Opcode::StoreCtxIVar
            | Opcode::StoreCtxSVar => 5,

            Opcode::SLoad
            | Opcode::LoadDVar
            | Opcode::LoadIVar
            | Opcode::LoadSVar
            | Opcode::StoreDVar
            | Opcode::StoreIVar
            | Opcode::StoreSVar
            | Opcode::Ja
            | Opcode::IfICmpNE
            | Opcode::IfICmpE
            | Opcode::IfICmpG
            | Opcode::IfICmpGE
            | Opcode::IfICmpL
            | Opcode::IfICmpLE
            | Opcode::Call
            | Opcode::CallNative => 3,

            _ => 1,
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Opcode::Ja
                | Opcode::IfICmpNE
                | Opcode::IfICmpE
                | Opcode::IfICmpG
                | Opcode::IfICmpGE
                | Opcode::IfICmpL
                | Opcode::IfICmpLE
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Invalid => "INVALID",
            Opcode::DLoad => "DLOAD",
            Opcode::ILoad => "ILOAD",
            Opcode::SLoad => "SLOAD",
            Opcode::DLoad0 => "DLOAD0",
            Opcode::ILoad0 => "ILOAD0",
            Opcode::SLoad0 => "SLOAD0",
            Opcode::DLoad1 => "DLOAD1",
            Opcode::ILoad1 => "ILOAD1",
            Opcode::DLoadM1 => "DLOADM1",
            Opcode::ILoadM1 => "ILOADM1",
            Opcode::DAdd => "DADD",
            Opcode::IAdd => "IADD",
            Opcode::DSub => "DSUB",
            Opcode::ISub => "ISUB",
            Opcode::DMul => "DMUL",
            Opcode::IMul => "IMUL",
            Opcode::DDiv => "DDIV",
            Opcode::IDiv => "IDIV",
            Opcode::IMod => "IMOD",
            Opcode::DNeg => "DNEG",
            Opcode::INeg => "INEG",
            Opcode::IAOr => "IAOR",
            Opcode::IAAnd => "IAAND",
            Opcode::IAXor => "IAXOR",
            Opcode::IPrint => "IPRINT",
            Opcode::DPrint => "DPRINT",
            Opcode::SPrint => "SPRINT",
            Opcode::I2D => "I2D",
            Opcode::D2I => "D2I",
            Opcode::S2I => "S2I",
            Opcode::Swap => "SWAP",
            Opcode::Pop => "POP",
            Opcode::LoadDVar => "LOADDVAR",
            Opcode::LoadIVar => "LOADIVAR",
            Opcode::LoadSVar => "LOADSVAR",
            Opcode::StoreDVar => "STOREDVAR",
            Opcode::StoreIVar => "STOREIVAR",
            Opcode::StoreSVar => "STORESVAR",
            Opcode::LoadCtxDVar => "LOADCTXDVAR",
            Opcode::LoadCtxIVar => "LOADCTXIVAR",
            Opcode::LoadCtxSVar => "LOADCTXSVAR",
            Opcode::StoreCtxDVar => "STORECTXDVAR",
            Opcode::StoreCtxIVar => "STORECTXIVAR",
            Opcode::StoreCtxSVar => "STORECTXSVAR",
            Opcode::DCmp => "DCMP",
            Opcode::ICmp => "ICMP",
            Opcode::Ja => "JA",
            Opcode::IfICmpNE => "IFICMPNE",
            Opcode::IfICmpE => "IFICMPE",
            Opcode::IfICmpG => "IFICMPG",
            Opcode::IfICmpGE => "IFICMPGE",
            Opcode::IfICmpL => "IFICMPL",
            Opcode::IfICmpLE => "IFICMPLE",
            Opcode::Dump => "DUMP",
            Opcode::Stop => "STOP",
            Opcode::Call => "CALL",
            Opcode::CallNative => "CALLNATIVE",
            Opcode::Return => "RETURN",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_byte(byte).ok_or(byte)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
