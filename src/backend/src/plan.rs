use {
    crate::names::Namer,
    frontend::{
        ast::{AssignOp, Block, Ident, Stmt, StmtKind},
        visit::{walk_block_mut, walk_stmt_mut, VisitorMut},
    },
    middle::{
        check::{DeclId, DeclKind, FuncInfo},
        types::Type,
    },
    std::collections::BTreeMap,
};

/// A variable saved in the frame across suspensions. Its index in
/// [`SlotPlan::slots`] is its index in the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub ty: Type,
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPlan {
    pub slots: Vec<Slot>,
}

impl SlotPlan {
    pub fn locals(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|slot| slot.kind == DeclKind::Local)
    }
}

struct Rename<'a> {
    info: &'a FuncInfo,
    names: &'a BTreeMap<DeclId, String>,
}

impl VisitorMut for Rename<'_> {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        // every local is declared upfront
        if let StmtKind::Assign { ref mut op, .. } = stmt.kind {
            if *op == AssignOp::Define {
                *op = AssignOp::Assign;
            }
        }
        walk_stmt_mut(self, stmt);
    }

    fn visit_ident(&mut self, ident: &mut Ident) {
        if let Some(name) = self.info.local(ident).and_then(|decl| self.names.get(&decl)) {
            ident.name.clone_from(name);
        }
    }
}

/// Assigns frame slots to parameters, named results and locals, in that
/// order, and renames every local to its own synthetic variable so that
/// shadowed declarations keep separate slots.
pub fn plan(body: &mut Block, info: &FuncInfo, namer: &mut Namer) -> SlotPlan {
    let mut slots = vec![];
    let mut names = BTreeMap::new();
    for kind in [DeclKind::Param, DeclKind::Result, DeclKind::Local] {
        for (index, decl) in info.decls.iter().enumerate() {
            if decl.kind != kind {
                continue;
            }
            let name = match kind {
                DeclKind::Local => {
                    let name = namer.fresh("_v");
                    names.insert(DeclId(index), name.clone());
                    name
                }
                DeclKind::Param | DeclKind::Result => decl.name.clone(),
            };
            slots.push(Slot {
                name,
                ty: decl.ty.clone(),
                kind,
            });
        }
    }
    walk_block_mut(
        &mut Rename {
            info,
            names: &names,
        },
        body,
    );
    SlotPlan { slots }
}
