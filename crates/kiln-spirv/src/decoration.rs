//! Decoration recording and resolution.
//!
//! Decorations are recorded on the value table as they appear. Resolving a
//! value's decorations walks its own list in order, expanding each group
//! reference depth-first where it occurs.

use spirv::{Decoration as Kind, Op};

use crate::ParseError;
use crate::translate::Translator;
use crate::value::{Value, ValueKind, ValueTable};
use crate::words::Instruction;

/// Group references nested deeper than this are rejected.
const MAX_GROUP_DEPTH: usize = 8;

#[derive(Clone, Debug)]
pub(crate) enum DecorationItem {
    Direct { kind: Kind, operands: Vec<u32> },
    /// Every decoration of the group applies.
    Group(u32),
}

#[derive(Clone, Debug)]
pub(crate) struct Decoration {
    /// Struct member the decoration applies to; `None` for the whole value.
    pub member: Option<u32>,
    pub item: DecorationItem,
}

/// A decoration after group expansion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Resolved {
    pub member: Option<u32>,
    pub kind: Kind,
    pub operands: Vec<u32>,
}

impl Resolved {
    /// First literal operand.
    pub fn literal(&self) -> Option<u32> {
        self.operands.first().copied()
    }
}

impl ValueTable {
    /// Decorations of `id` in application order.
    pub fn decorations(&self, id: u32) -> Result<Vec<Resolved>, ParseError> {
        let mut out = Vec::new();
        self.expand(id, None, 0, &mut out)?;
        Ok(out)
    }

    fn expand(
        &self,
        id: u32,
        parent_member: Option<u32>,
        depth: usize,
        out: &mut Vec<Resolved>,
    ) -> Result<(), ParseError> {
        if depth > MAX_GROUP_DEPTH {
            return Err(ParseError::Lowering(format!(
                "decoration group %{id} nested too deeply"
            )));
        }
        for dec in self.raw_decorations(id)? {
            let member = dec.member.or(parent_member);
            match dec.item {
                DecorationItem::Group(group) => self.expand(group, member, depth + 1, out)?,
                DecorationItem::Direct { kind, ref operands } => out.push(Resolved {
                    member,
                    kind,
                    operands: operands.clone(),
                }),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Annotation instructions
// ---------------------------------------------------------------------------

impl Translator<'_> {
    pub(crate) fn handle_decoration(&mut self, instr: &Instruction<'_>) -> Result<(), ParseError> {
        match instr.op {
            Op::Decorate => {
                let target = instr.operand(0)?;
                self.record_direct(instr, target, None, 1)
            }
            Op::MemberDecorate => {
                let target = instr.operand(0)?;
                let member = instr.operand(1)?;
                self.record_direct(instr, target, Some(member), 2)
            }
            Op::DecorationGroup => self.values.push(instr.operand(0)?, Value::DecorationGroup),
            Op::GroupDecorate => {
                let group = instr.operand(0)?;
                self.values.get(group, ValueKind::DecorationGroup)?;
                for &target in instr.operands_from(1) {
                    self.values.decorate(
                        target,
                        Decoration {
                            member: None,
                            item: DecorationItem::Group(group),
                        },
                    )?;
                }
                Ok(())
            }
            Op::GroupMemberDecorate => {
                let group = instr.operand(0)?;
                self.values.get(group, ValueKind::DecorationGroup)?;
                let pairs = instr.operands_from(1);
                if pairs.len() % 2 != 0 {
                    return Err(ParseError::InvalidOperands(instr.op));
                }
                for pair in pairs.chunks_exact(2) {
                    self.values.decorate(
                        pair[0],
                        Decoration {
                            member: Some(pair[1]),
                            item: DecorationItem::Group(group),
                        },
                    )?;
                }
                Ok(())
            }
            op => Err(ParseError::UnsupportedOpcode(op)),
        }
    }

    fn record_direct(
        &mut self,
        instr: &Instruction<'_>,
        target: u32,
        member: Option<u32>,
        kind_at: usize,
    ) -> Result<(), ParseError> {
        let raw = instr.operand(kind_at)?;
        let Some(kind) = Kind::from_u32(raw) else {
            log::trace!("ignoring unknown decoration {raw} on %{target}");
            return Ok(());
        };
        self.values.decorate(
            target,
            Decoration {
                member,
                item: DecorationItem::Direct {
                    kind,
                    operands: instr.operands_from(kind_at + 1).to_vec(),
                },
            },
        )
    }
}
