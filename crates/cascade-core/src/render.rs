//! Text rendering of the grid for logs, reports and tests

use cascade_simulation::{MaterialType, Materials};

use crate::grid::Grid;

/// Glyph for a cell. Liquids show their fill level.
fn glyph(material_type: MaterialType, mass: f32, max_mass: f32) -> char {
    match material_type {
        MaterialType::Solid => '#',
        MaterialType::Powder => ':',
        MaterialType::Liquid => {
            let fill = mass / max_mass;
            if fill > 1.0 + f32::EPSILON {
                '%'
            } else if fill >= 0.75 {
                '~'
            } else if fill >= 0.25 {
                '-'
            } else {
                '.'
            }
        }
        MaterialType::Gas => ' ',
    }
}

/// One line per row, top row first
pub fn render_ascii(grid: &Grid, materials: &Materials, max_mass: f32) -> String {
    let mut out = String::with_capacity((grid.width() + 1) * grid.height());
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            let cell = grid.get_index(x + y * grid.width());
            let material_type = materials
                .try_get(cell.material_id)
                .map_or(MaterialType::Gas, |m| m.material_type);
            out.push(glyph(material_type, cell.mass, max_mass));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_simulation::{Cell, MaterialId};

    #[test]
    fn test_render_ascii() {
        let materials = Materials::with_defaults();
        let mut grid = Grid::new(4, 2).unwrap();
        grid.set(0, 0, Cell::solid(MaterialId::STONE));
        grid.set(1, 0, Cell::solid(MaterialId::SAND));
        grid.set(0, 1, Cell::new(MaterialId::WATER, 1.0));
        grid.set(1, 1, Cell::new(MaterialId::WATER, 0.5));
        grid.set(2, 1, Cell::new(MaterialId::WATER, 0.1));
        grid.set(3, 1, Cell::new(MaterialId::WATER, 1.2));

        assert_eq!(render_ascii(&grid, &materials, 1.0), "#:  \n~-.%\n");
    }
}
