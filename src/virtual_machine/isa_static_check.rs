#[cfg(test)]
mod tests {
    use crate::virtual_machine::isa::{MAX_PARAMS, Opcode};
    use crate::virtual_machine::operand::Role;
    use std::collections::HashSet;

    macro_rules! collect_table {
        (
            $( $(#[$doc:meta])* $name:ident = $opcode:literal, $mnemonic:literal => [ $( $field:ident : $role:ident ),* $(,)? ] ),* $(,)?
        ) => {
            vec![ $( ($opcode as i64, $mnemonic, vec![ $( stringify!($field) ),* ]) ),* ]
        };
    }

    fn table() -> Vec<(i64, &'static str, Vec<&'static str>)> {
        crate::for_each_instruction!(collect_table)
    }

    #[test]
    fn opcodes_fit_in_two_digits() {
        for (code, mnemonic, _) in table() {
            assert!((1..100).contains(&code), "{mnemonic} has code {code}");
        }
    }

    #[test]
    fn codes_and_mnemonics_are_unique() {
        let table = table();
        let codes: HashSet<_> = table.iter().map(|(code, _, _)| *code).collect();
        let mnemonics: HashSet<_> = table.iter().map(|(_, m, _)| *m).collect();
        assert_eq!(codes.len(), table.len());
        assert_eq!(mnemonics.len(), table.len());
    }

    #[test]
    fn field_lists_match_roles() {
        for (code, _, fields) in table() {
            let opcode = Opcode::try_from(code).unwrap();
            assert_eq!(opcode.arity(), fields.len());
            assert!(opcode.arity() <= MAX_PARAMS);
        }
    }

    #[test]
    fn write_target_is_always_last() {
        for opcode in Opcode::ALL {
            let roles = opcode.roles();
            let writes = roles.iter().filter(|r| **r == Role::Write).count();
            assert!(writes <= 1, "{} has {writes} write targets", opcode.mnemonic());
            if writes == 1 {
                assert_eq!(roles.last(), Some(&Role::Write));
            }
        }
    }
}
