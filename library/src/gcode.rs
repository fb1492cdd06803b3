use arrayvec::ArrayVec;

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum Mnemonic {
    #[default]
    G,
    M,
    T,
}

// A parsed command, as handed over by the gcode frontend. Only the pieces
// the motion core reacts to are carried: the mnemonic, the major number and
// any bare letters (M84 E keeps the extruder energized).
#[derive(Clone, Default, Debug)]
pub struct GcodeCommand {
    pub mnemonic: Mnemonic,
    pub major: u16,
    letters: ArrayVec<char, 4>,
}

impl GcodeCommand {
    pub fn m(major: u16) -> Self {
        Self { mnemonic: Mnemonic::M, major, letters: ArrayVec::new() }
    }

    pub fn g(major: u16) -> Self {
        Self { mnemonic: Mnemonic::G, major, letters: ArrayVec::new() }
    }

    pub fn with_letter(mut self, letter: char) -> Self {
        let _ = self.letters.try_push(letter);
        self
    }

    pub fn has_letter(&self, letter: char) -> bool {
        self.letters.contains(&letter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m_command() {
        let g = GcodeCommand::m(84);
        assert_eq!(g.mnemonic, Mnemonic::M);
        assert_eq!(g.major, 84);
        assert_eq!(g.has_letter('E'), false);
    }

    #[test]
    fn letters_are_found() {
        let g = GcodeCommand::m(18).with_letter('E');
        assert_eq!(g.has_letter('E'), true);
        assert_eq!(g.has_letter('X'), false);
    }
}
