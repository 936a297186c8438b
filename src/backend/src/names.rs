use {
    frontend::{
        ast::{FuncDecl, Ident, Stmt, StmtKind},
        visit::{walk_block, walk_stmt, Visitor},
    },
    std::collections::{BTreeMap, BTreeSet},
};

/// Hands out synthetic names that collide with nothing declared, referenced
/// or used as a label in one function.
#[derive(Debug, Default)]
pub struct Namer {
    taken: BTreeSet<String>,
    counters: BTreeMap<&'static str, usize>,
}

impl Visitor for Namer {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt.kind {
            StmtKind::Labeled { ref label, .. }
            | StmtKind::Branch {
                label: Some(ref label),
                ..
            } => {
                self.taken.insert(label.clone());
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_ident(&mut self, ident: &Ident) {
        self.taken.insert(ident.name.clone());
    }
}

impl Namer {
    pub fn new(func: &FuncDecl) -> Self {
        let mut namer = Self::default();
        for field in func.ty.params.iter().chain(&func.ty.results) {
            for name in &field.names {
                namer.visit_ident(name);
            }
        }
        if let Some(body) = &func.body {
            walk_block(&mut namer, body);
        }
        namer
    }

    /// `prefix` followed by the lowest counter value not yet used.
    pub fn fresh(&mut self, prefix: &'static str) -> String {
        loop {
            let counter = self.counters.entry(prefix).or_default();
            let name = format!("{prefix}{counter}");
            *counter += 1;
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    /// `name` itself if it is free, a numbered variant of it otherwise.
    pub fn unique(&mut self, name: &'static str) -> String {
        if self.taken.insert(name.to_owned()) {
            name.to_owned()
        } else {
            self.fresh(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, frontend::ast::File};

    #[test]
    fn avoids_names_used_by_the_function() {
        let file =
            File::try_from("package p\nfunc f(_v0 int) {\n_l0:\n\tfor {\n\t\t_c := _v0\n\t\t_ = _c\n\t}\n}\n")
                .unwrap();
        let mut namer = Namer::new(&file.funcs[0]);
        assert_eq!(namer.unique("_c"), "_c0");
        assert_eq!(namer.unique("_f"), "_f");
        assert_eq!(namer.fresh("_v"), "_v1");
        assert_eq!(namer.fresh("_v"), "_v2");
        assert_eq!(namer.fresh("_l"), "_l1");
    }
}
