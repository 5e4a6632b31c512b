//! Tic-tac-toe board and win/draw evaluation.

use shared::Mark;
use std::collections::BTreeSet;

/// Side length used by game sessions.
pub const BOARD_SIZE: usize = 3;

/// N×N grid addressed by row-major cell index (`row * N + col`).
///
/// The board trusts its caller: [`Board::apply_move`] panics on an occupied
/// or out-of-range cell, so check [`Board::is_free`] first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board<const N: usize> {
    cells: [[Option<Mark>; N]; N],
    move_count: usize,
    turn: Mark,
}

impl<const N: usize> Board<N> {
    pub const CELLS: usize = N * N;

    pub fn new() -> Self {
        Self {
            cells: [[None; N]; N],
            move_count: 0,
            turn: Mark::O,
        }
    }

    /// Mark that the next accepted move writes.
    pub fn turn(&self) -> Mark {
        self.turn
    }

    pub fn move_count(&self) -> usize {
        self.move_count
    }

    pub fn cell(&self, index: usize) -> Option<Mark> {
        let (row, col) = Self::coords(index);
        self.cells[row][col]
    }

    pub fn in_range(index: usize) -> bool {
        index < Self::CELLS
    }

    pub fn is_free(&self, index: usize) -> bool {
        Self::in_range(index) && self.cell(index).is_none()
    }

    /// Writes the current turn mark at `index`, flips the turn and returns
    /// the mark written.
    pub fn apply_move(&mut self, index: usize) -> Mark {
        assert!(Self::in_range(index), "cell {} is outside the board", index);
        let (row, col) = Self::coords(index);
        assert!(self.cells[row][col].is_none(), "cell {} is already taken", index);

        let mark = self.turn;
        self.cells[row][col] = Some(mark);
        self.move_count += 1;
        self.turn = mark.other();
        mark
    }

    pub fn is_won(&self) -> bool {
        let rows = (0..N).map(|row| Self::line_wins((0..N).map(|col| self.cells[row][col])));
        let cols = (0..N).map(|col| Self::line_wins((0..N).map(|row| self.cells[row][col])));

        rows.chain(cols).any(|won| won)
            || Self::line_wins((0..N).map(|i| self.cells[i][i]))
            || Self::line_wins((0..N).map(|i| self.cells[i][N - 1 - i]))
    }

    /// Board is full and nobody completed a line.
    pub fn is_draw(&self) -> bool {
        self.move_count == Self::CELLS && !self.is_won()
    }

    /// Clears the grid and the move counter. The turn mark carries over.
    pub fn reset(&mut self) {
        self.cells = [[None; N]; N];
        self.move_count = 0;
    }

    fn coords(index: usize) -> (usize, usize) {
        (index / N, index % N)
    }

    fn line_wins(line: impl Iterator<Item = Option<Mark>>) -> bool {
        let distinct: BTreeSet<Option<Mark>> = line.collect();
        distinct.len() == 1 && !distinct.contains(&None)
    }
}

impl<const N: usize> Default for Board<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Board3 = Board<3>;

    fn board_with(moves: &[usize]) -> Board3 {
        let mut board = Board3::new();
        for &cell in moves {
            board.apply_move(cell);
        }
        board
    }

    #[test]
    fn test_empty_board() {
        let board = Board3::new();
        assert_eq!(Board3::CELLS, 9);
        assert_eq!(board.move_count(), 0);
        assert_eq!(board.turn(), Mark::O);
        assert!(!board.is_won());
        assert!(!board.is_draw());
        assert!((0..9).all(|cell| board.is_free(cell)));
    }

    #[test]
    fn test_apply_move_alternates_marks() {
        let mut board = Board3::new();
        assert_eq!(board.apply_move(4), Mark::O);
        assert_eq!(board.apply_move(0), Mark::X);
        assert_eq!(board.cell(4), Some(Mark::O));
        assert_eq!(board.cell(0), Some(Mark::X));
        assert_eq!(board.move_count(), 2);
        assert_eq!(board.turn(), Mark::O);
        assert!(!board.is_free(4));
    }

    #[test]
    fn test_row_win() {
        // O: 0 1 2, X: 3 4
        let board = board_with(&[0, 3, 1, 4, 2]);
        assert!(board.is_won());
        assert!(!board.is_draw());
    }

    #[test]
    fn test_column_win() {
        // O: 1 4 7, X: 0 2
        let board = board_with(&[1, 0, 4, 2, 7]);
        assert!(board.is_won());
    }

    #[test]
    fn test_diagonal_wins() {
        // O: 0 4 8
        assert!(board_with(&[0, 1, 4, 2, 8]).is_won());
        // O: 2 4 6
        assert!(board_with(&[2, 0, 4, 1, 6]).is_won());
    }

    #[test]
    fn test_mixed_line_is_not_a_win() {
        // Row 0 holds O X O.
        let board = board_with(&[0, 1, 2]);
        assert!(!board.is_won());
    }

    #[test]
    fn test_draw_on_full_board_without_line() {
        // O X O
        // O X X
        // X O O
        let board = board_with(&[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(board.move_count(), 9);
        assert!(!board.is_won());
        assert!(board.is_draw());
    }

    #[test]
    fn test_win_on_last_move_is_not_a_draw() {
        // O X O
        // X O X
        // X O O   <- last move completes the main diagonal
        let board = board_with(&[0, 1, 2, 3, 4, 5, 7, 6, 8]);
        assert_eq!(board.move_count(), 9);
        assert!(board.is_won());
        assert!(!board.is_draw());
    }

    #[test]
    fn test_reset_keeps_turn() {
        let mut board = board_with(&[0, 1, 2]);
        assert_eq!(board.turn(), Mark::X);
        board.reset();
        assert_eq!(board.move_count(), 0);
        assert!((0..9).all(|cell| board.is_free(cell)));
        assert_eq!(board.turn(), Mark::X);
    }

    #[test]
    fn test_larger_board() {
        let mut board = Board::<4>::new();
        assert_eq!(Board::<4>::CELLS, 16);
        // O fills column 3, X plays elsewhere.
        for (o, x) in [(3, 0), (7, 1), (11, 2)] {
            board.apply_move(o);
            board.apply_move(x);
        }
        assert!(!board.is_won());
        board.apply_move(15);
        assert!(board.is_won());
    }

    #[test]
    fn test_range_checks() {
        let board = Board3::new();
        assert!(Board3::in_range(8));
        assert!(!Board3::in_range(9));
        assert!(!board.is_free(9));
    }

    #[test]
    #[should_panic(expected = "outside the board")]
    fn test_out_of_range_move_panics() {
        Board3::new().apply_move(9);
    }

    #[test]
    #[should_panic(expected = "already taken")]
    fn test_occupied_cell_panics() {
        board_with(&[4, 4]);
    }
}
